use linfa::prelude::*;
use linfa_vda::{Algorithm, Vda};

#[test]
fn classifies_iris() {
    let dataset = linfa_datasets::iris();
    // on the raw features a narrow deadzone stays below 0.9 accuracy
    let model = Vda::<_, usize>::params().epsilon(0.5).fit(&dataset).unwrap();

    assert_eq!(model.classes(), &[0, 1, 2]);
    assert_eq!(model.weights().dim(), (4, 2));

    let cm = model.predict(&dataset).confusion_matrix(&dataset).unwrap();
    assert!(cm.accuracy() > 0.9, "accuracy {}", cm.accuracy());
}

#[test]
fn keeps_requested_number_of_features() {
    let dataset = linfa_datasets::iris();

    for (sparsity, active) in [(0.25, 3), (0.5, 2), (0.75, 1), (1.0, 0)].iter() {
        let model = Vda::<_, usize>::params()
            .sparsity(*sparsity)
            .algorithm(Algorithm::Cholesky)
            .max_inner_iterations(1_000)
            .fit(&dataset)
            .unwrap();

        assert_eq!(model.active_features().len(), *active);
    }
}
