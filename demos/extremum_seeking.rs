use seqopt::generators::extremum_seeking::{ExtremumSeekingGenerator, ExtremumSeekingOptions};
use seqopt::{Generator, ObjectiveDirection, Table, Vocs};

// Quadratic bowl whose minimum slowly drifts along the first axis.
fn drifting(x: &[f64], step: usize) -> f64 {
    let shift = 0.3 * (step as f64 / 200.0).sin();
    (x[0] - shift).powi(2) + (x[1] + 0.2).powi(2)
}

fn main() -> Result<(), String> {
    let vocs = Vocs::builder()
        .variable("x1", -1.0, 1.0)
        .variable("x2", -1.0, 1.0)
        .objective("f", ObjectiveDirection::Minimize)
        .build()
        .map_err(|error| format!("{error}"))?;

    let mut options = ExtremumSeekingOptions::default();
    options
        .set_k(4.0)
        .and_then(|options| options.set_oscillation_size(0.2))
        .map_err(|error| format!("{error}"))?;

    let mut generator =
        ExtremumSeekingGenerator::with_options(vocs, options).map_err(|error| format!("{error}"))?;

    for step in 0..500 {
        let candidates = generator.generate(1).map_err(|error| format!("{error}"))?;

        let observations = Table::from_records(candidates.records().map(|mut record| {
            let value = drifting(&[record["x1"], record["x2"]], step);
            record.insert("f".to_string(), value);
            record
        }));

        if step % 50 == 0 {
            println!("step = {}\tobservation = {:?}", step, observations.record(0));
        }

        generator
            .add_data(&observations)
            .map_err(|error| format!("{error}"))?;
    }

    Ok(())
}
