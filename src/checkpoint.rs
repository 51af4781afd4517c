/*!
Chain checkpoints.

A [`Checkpoint`] captures everything a single chain needs to continue where
it stopped: the current trace, the chain seed, the step counter and whether
observations are validated. Since step
`i` of a chain always uses `seed.fold_in(i)`, resuming from a checkpoint
reproduces the exact continuation of the uninterrupted run.

Checkpoints are stored as JSON. A trace with a non-finite score cannot be
written, since JSON has no representation for it.
*/

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::seed::Seed;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<T> {
    pub trace: T,
    pub seed: Seed,
    pub steps_done: u64,
    pub accepted: u64,
    #[serde(default)]
    pub validate: bool,
}

impl<T> Checkpoint<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        log::debug!(
            "saved checkpoint after {} steps to {}",
            self.steps_done,
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }
}
