use linfa::{
    dataset::{AsSingleTargets, DatasetBase},
    traits::{Fit, PredictInplace},
    Float,
};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix2, Zip};
use rand::Rng;

use crate::error::{Result, VdaError};
use crate::hyperparams::VdaValidParams;
use crate::problem::{simplex_vertices, VdaProblem};
use crate::solver::{self, init_regularized};
use crate::Vda;

impl<F, R, C, D, T> Fit<ArrayBase<D, Ix2>, T, VdaError> for VdaValidParams<F, R>
where
    F: Float,
    R: Rng + Clone,
    C: Ord + Clone,
    D: Data<Elem = F>,
    T: AsSingleTargets<Elem = C>,
{
    type Object = Vda<F, C>;

    /// Fit a sparse vertex discriminant model
    ///
    /// Every class is encoded as a vertex of a regular simplex, the coefficients are
    /// initialized (randomly or by a ridge regularized solve) and the penalty is annealed
    /// until at most `round((1 - sparsity) * n_features)` features remain active.
    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, T>) -> Result<Self::Object> {
        let x = dataset.records();
        let (classes, vertices, targets) = encode_classes(dataset.targets().as_single_targets())?;

        let mut problem = VdaProblem::new(x, targets, self.with_intercept())?;
        let k = problem.sparsity_to_k(self.sparsity());
        let options = self.options();
        let mut rng = self.rng().clone();

        let mut backend = self.algorithm().init(&problem);
        if self.warm_start() {
            init_regularized(&mut problem, &mut backend, options, &mut rng)?;
        } else {
            problem.randomize(&mut rng);
        }

        let result = solver::fit(&mut problem, &mut backend, options, k, &mut rng, &mut ())?;
        tracing::debug!(
            "fitted {} classes with {} of {} features in {} iterations",
            classes.len(),
            k,
            problem.npredictors(),
            result.iterations
        );

        Ok(Vda::from_problem(&problem, vertices, classes, result))
    }
}

/// Sort and deduplicate the classes of `y` and encode every sample by the simplex vertex of
/// its class
fn encode_classes<F: Float, C: Ord + Clone>(
    y: ArrayView1<C>,
) -> Result<(Vec<C>, Array2<F>, Array2<F>)> {
    let mut classes = y.to_vec();
    classes.sort();
    classes.dedup();

    let vertices = simplex_vertices(classes.len())?;
    let mut targets = Array2::zeros((y.len(), vertices.ncols()));
    for (mut row, class) in targets.axis_iter_mut(Axis(0)).zip(y.iter()) {
        // classes are sorted, so the search always succeeds
        if let Ok(idx) = classes.binary_search(class) {
            row.assign(&vertices.row(idx));
        }
    }

    Ok((classes, vertices, targets))
}

impl<F: Float, C: Clone> Vda<F, C> {
    /// Scores of the samples in the vertex space, `x W + b`
    ///
    /// The result has shape `(n_samples, n_classes - 1)`.
    pub fn decision_function<D: Data<Elem = F>>(&self, x: &ArrayBase<D, Ix2>) -> Array2<F> {
        x.dot(&self.weights) + &self.intercept
    }

    /// Index of the vertex closest to `score`
    fn nearest_vertex(&self, score: ArrayView1<F>) -> usize {
        let mut best = (0, F::infinity());
        for (j, vertex) in self.vertices.rows().into_iter().enumerate() {
            let dist = Zip::from(&score)
                .and(&vertex)
                .fold(F::zero(), |acc, s, v| acc + (*s - *v) * (*s - *v));
            if dist < best.1 {
                best = (j, dist);
            }
        }
        best.0
    }
}

impl<F: Float, C: Clone + Default, D: Data<Elem = F>> PredictInplace<ArrayBase<D, Ix2>, Array1<C>>
    for Vda<F, C>
{
    /// Assign every sample to the class whose vertex is nearest to its score
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<C>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );
        assert_eq!(
            x.ncols(),
            self.weights.nrows(),
            "Number of data features must match the number of features the model was trained with."
        );

        let scores = self.decision_function(x);
        Zip::from(scores.rows()).and(y).for_each(|score, out| {
            *out = self.classes[self.nearest_vertex(score)].clone();
        });
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<C> {
        Array1::default(x.nrows())
    }
}
