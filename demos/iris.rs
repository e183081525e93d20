use linfa::prelude::*;
use linfa_vda::Vda;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use tracing_subscriber::EnvFilter;

use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // set RUST_LOG=linfa_vda=debug to follow the annealing rounds
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let mut dataset = linfa_datasets::iris().shuffle(&mut rng);

    // keep four, three, two and one of the four features
    let sparsities = &[0., 0.25, 0.5, 0.75];
    let models: Vec<_> = sparsities
        .iter()
        .map(|sparsity| Vda::<_, usize>::params().sparsity(*sparsity).epsilon(0.5))
        .collect();

    let accuracies = dataset.cross_validate_single(5, &models, |prediction, truth| {
        Ok(prediction.confusion_matrix(truth)?.accuracy())
    })?;

    for (sparsity, accuracy) in sparsities.iter().zip(accuracies.iter()) {
        println!("Sparsity: {}, accuracy: {}", sparsity, accuracy);
    }

    let model = Vda::<_, usize>::params()
        .sparsity(0.5)
        .epsilon(0.5)
        .fit(&dataset)?;

    println!("{}", model);
    println!("active features: {:?}", model.active_features());

    let cm = model.predict(&dataset).confusion_matrix(&dataset)?;
    println!("{:?}", cm);
    println!("accuracy {}, MCC {}", cm.accuracy(), cm.mcc());

    Ok(())
}
