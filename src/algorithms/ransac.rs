//! Confidence-driven RANSAC behind the `sample_consensus` traits, so it can be
//! swapped with `arrsac::Arrsac` wherever a [`Consensus`] is expected.

use rand::{seq::index, RngCore};
use sample_consensus::{Consensus, Estimator, Model};

/// Classic RANSAC with an adaptive iteration bound.
///
/// After every improvement the bound is shrunk to the number of draws needed to
/// see one all-inlier minimal sample with probability `confidence`, given the
/// best inlier ratio so far. The winning model is refit on its consensus set.
pub struct Ransac<R> {
    threshold: f64,
    confidence: f64,
    max_iterations: usize,
    rng: R,
}

impl<R: RngCore> Ransac<R> {
    pub fn new(threshold: f64, confidence: f64, max_iterations: usize, rng: R) -> Self {
        Self {
            threshold,
            confidence,
            max_iterations,
            rng,
        }
    }

    fn score<M, Data>(&self, model: &M, data: &[Data]) -> (Vec<usize>, f64)
    where
        M: Model<Data>,
    {
        let mut inliers = Vec::new();
        let mut residual_sum = 0.0;
        for (i, datum) in data.iter().enumerate() {
            let residual = model.residual(datum);
            if residual <= self.threshold {
                inliers.push(i);
                residual_sum += residual;
            }
        }
        (inliers, residual_sum)
    }
}

/// Draws needed for an all-inlier sample with the given confidence.
fn required_iterations(
    confidence: f64,
    inlier_ratio: f64,
    min_samples: usize,
    iterations_so_far: usize,
    max_iterations: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iterations;
    }

    let denominator = (1.0 - inlier_ratio.powi(min_samples as i32)).max(1e-12).ln();
    if denominator >= 0.0 {
        return max_iterations;
    }

    let needed = ((1.0 - confidence).max(f64::MIN_POSITIVE).ln() / denominator).ceil() as usize;
    needed.clamp(iterations_so_far, max_iterations)
}

/// More inliers wins; ties go to the lower residual sum.
fn is_better(candidate: &(Vec<usize>, f64), best: Option<&(Vec<usize>, f64)>) -> bool {
    match best {
        None => !candidate.0.is_empty(),
        Some(best) => {
            candidate.0.len() > best.0.len()
                || (candidate.0.len() == best.0.len() && candidate.1 < best.1)
        }
    }
}

impl<E, R, Data> Consensus<E, Data> for Ransac<R>
where
    E: Estimator<Data>,
    R: RngCore,
    Data: Clone,
{
    type Inliers = Vec<usize>;

    fn model<I>(&mut self, estimator: &E, data: I) -> Option<E::Model>
    where
        I: Iterator<Item = Data> + Clone,
    {
        self.model_inliers(estimator, data).map(|(model, _)| model)
    }

    fn model_inliers<I>(&mut self, estimator: &E, data: I) -> Option<(E::Model, Self::Inliers)>
    where
        I: Iterator<Item = Data> + Clone,
    {
        let data: Vec<Data> = data.collect();
        if data.len() < E::MIN_SAMPLES {
            return None;
        }

        let mut best: Option<(E::Model, (Vec<usize>, f64))> = None;
        let mut iteration_bound = self.max_iterations;
        let mut iterations = 0;

        while iterations < iteration_bound {
            iterations += 1;

            let sample = index::sample(&mut self.rng, data.len(), E::MIN_SAMPLES).into_vec();
            let models = estimator.estimate(sample.iter().map(|&i| data[i].clone()));

            for model in models {
                let scored = self.score(&model, &data);
                if is_better(&scored, best.as_ref().map(|(_, s)| s)) {
                    let inlier_ratio = scored.0.len() as f64 / data.len() as f64;
                    best = Some((model, scored));
                    iteration_bound = required_iterations(
                        self.confidence,
                        inlier_ratio,
                        E::MIN_SAMPLES,
                        iterations,
                        self.max_iterations,
                    );
                }
            }
        }

        let (mut model, mut scored) = best?;
        if scored.0.len() < E::MIN_SAMPLES {
            return None;
        }

        // refit on the consensus set; keep the refit only if it does not lose support
        let refits = estimator.estimate(scored.0.iter().map(|&i| data[i].clone()));
        for refit in refits {
            let rescored = self.score(&refit, &data);
            if rescored.0.len() >= scored.0.len() {
                model = refit;
                scored = rescored;
            }
        }

        Some((model, scored.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[derive(Debug, Clone, Copy)]
    struct Line {
        slope: f64,
        intercept: f64,
    }

    impl Model<(f64, f64)> for Line {
        fn residual(&self, &(x, y): &(f64, f64)) -> f64 {
            (self.slope * x - y + self.intercept).abs() / (self.slope * self.slope + 1.0).sqrt()
        }
    }

    struct LineEstimator;

    impl Estimator<(f64, f64)> for LineEstimator {
        type Model = Line;
        type ModelIter = Option<Line>;
        const MIN_SAMPLES: usize = 2;

        fn estimate<I>(&self, data: I) -> Self::ModelIter
        where
            I: Iterator<Item = (f64, f64)> + Clone,
        {
            // least squares through every given point
            let points: Vec<_> = data.collect();
            let n = points.len() as f64;
            let (sx, sy, sxx, sxy) = points.iter().fold((0.0, 0.0, 0.0, 0.0), |acc, &(x, y)| {
                (acc.0 + x, acc.1 + y, acc.2 + x * x, acc.3 + x * y)
            });
            let denominator = n * sxx - sx * sx;
            if denominator.abs() < 1e-12 {
                return None;
            }
            let slope = (n * sxy - sx * sy) / denominator;
            Some(Line {
                slope,
                intercept: (sy - slope * sx) / n,
            })
        }
    }

    fn ransac() -> Ransac<StdRng> {
        Ransac::new(0.05, 0.999, 500, StdRng::seed_from_u64(7))
    }

    #[test]
    fn recovers_line_with_outliers() {
        let mut data: Vec<(f64, f64)> = (0..20)
            .map(|i| {
                let x = i as f64 * 0.5;
                (x, 2.0 * x + 1.0 + if i % 2 == 0 { 0.01 } else { -0.01 })
            })
            .collect();
        data.extend([(5.0, -3.0), (6.0, 10.0), (7.0, -8.0), (1.0, 9.0)]);

        let (line, inliers) = ransac()
            .model_inliers(&LineEstimator, data.iter().copied())
            .expect("consensus");

        assert!((line.slope - 2.0).abs() < 0.05);
        assert!((line.intercept - 1.0).abs() < 0.05);
        assert_eq!(inliers, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn too_little_data_has_no_consensus() {
        let data = [(0.0, 0.0)];
        assert!(ransac().model(&LineEstimator, data.iter().copied()).is_none());
    }

    #[test]
    fn iteration_bound_shrinks_with_inlier_ratio() {
        let all_inliers = required_iterations(0.999, 1.0, 8, 1, 1000);
        let half_inliers = required_iterations(0.999, 0.5, 8, 1, 1000);
        assert_eq!(all_inliers, 1);
        assert!(half_inliers > 100 && half_inliers <= 1000);
        assert_eq!(required_iterations(0.999, 0.0, 8, 1, 1000), 1000);
    }
}
