/*!
# Saving chains of traces to CSV

Enable via the `csv` feature.
*/

use std::fmt::Display;
use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::address::Address;
use crate::error::{MhError, Result};
use crate::metropolis_hastings::Chain;
use crate::trace::Trace;

/**
Saves the recorded traces of `chains` as a CSV file.

The resulting CSV file will have:
- A header row containing `"chain"`, `"sample"`, and one column per monitored
  address, named by the address (`mu`, `y/0`, ...).
- One row per recorded trace, chains in order.

A trace without a value at one of `addresses` fails with
[`MhError::InvalidAddress`].

# Examples

```rust
use trace_mh::address::ChoiceMap;
use trace_mh::io::csv::save_csv;
use trace_mh::metropolis_hastings::Chain;
use trace_mh::trace::Trace;

let trace = Trace::new((), ChoiceMap::singleton(&"x".into(), 1.5), (), 0.0);
let chain = Chain {
    traces: vec![trace.clone()],
    final_trace: trace,
    n_accepted: 1,
    n_steps: 1,
};
save_csv(&[chain], &["x".into()], "/tmp/trace_mh_output.csv")?;
# Ok::<(), trace_mh::error::MhError>(())
```
*/
pub fn save_csv<A, V, R, P>(
    chains: &[Chain<Trace<A, V, R>>],
    addresses: &[Address],
    filename: P,
) -> Result<()>
where
    V: Display,
    P: AsRef<Path>,
{
    let mut wtr = Writer::from_writer(File::create(filename.as_ref())?);

    let mut header: Vec<String> = vec!["chain".to_string(), "sample".to_string()];
    header.extend(addresses.iter().map(Address::to_string));
    wtr.write_record(&header)?;

    for (chain_idx, chain) in chains.iter().enumerate() {
        for (sample_idx, trace) in chain.traces.iter().enumerate() {
            let mut row = vec![chain_idx.to_string(), sample_idx.to_string()];
            for address in addresses {
                let value = trace
                    .get(address)
                    .ok_or_else(|| MhError::InvalidAddress(address.clone()))?;
                row.push(value.to_string());
            }
            wtr.write_record(&row)?;
        }
    }

    wtr.flush()?;
    log::info!(
        "saved {} chains to {}",
        chains.len(),
        filename.as_ref().display()
    );
    Ok(())
}
