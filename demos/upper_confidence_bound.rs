use seqopt::generators::upper_confidence_bound::{UcbOptions, UpperConfidenceBoundGenerator};
use seqopt::testing::{best_value, evaluate, ConstrainedQuadratic, TestFunction};
use seqopt::Generator;

fn main() -> Result<(), String> {
    let f = ConstrainedQuadratic;

    let mut options = UcbOptions::default();
    options
        .acq_mut()
        .set_beta(0.5)
        .map_err(|error| format!("{error}"))?;

    let mut generator = UpperConfidenceBoundGenerator::with_options(f.vocs(), options)
        .map_err(|error| format!("{error}"))?
        .with_seed(42);

    for iter in 0..20 {
        let candidates = generator.generate(1).map_err(|error| format!("{error}"))?;
        let observations = evaluate(&f, &candidates);
        generator
            .add_data(&observations)
            .map_err(|error| format!("{error}"))?;

        println!(
            "iter = {}\tbest = {:?}",
            iter,
            best_value(generator.vocs(), generator.data())
        );
    }

    match f.optimum() {
        Some(optimum) => println!("known optimum at {:?}", optimum),
        None => println!("optimum unknown"),
    }

    Ok(())
}
