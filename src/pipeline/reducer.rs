//! Statistical reducers collapsing a list of numbers into one value
//!
//! Names are resolved once when the configuration is built; the hot path
//! only matches on the enum. Undefined results (e.g. the sample variance of a
//! single value) are `NaN`.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reducer {
    Mean,
    Median,
    Min,
    Max,
    Sum,
    Product,
    UniqueCount,
    GeometricMean,
    HarmonicMean,
    InterquartileRange,
    MedianAbsoluteDeviation,
    Mode,
    RootMeanSquare,
    SampleKurtosis,
    SampleSkewness,
    SampleStandardDeviation,
    StandardDeviation,
    Variance,
}

impl Reducer {
    /// Resolves a reducer by name, falling back to [`Reducer::Mean`]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "mean" => Reducer::Mean,
            "median" => Reducer::Median,
            "min" => Reducer::Min,
            "max" => Reducer::Max,
            "sum" => Reducer::Sum,
            "product" => Reducer::Product,
            "uniquecount" => Reducer::UniqueCount,
            "geometricmean" => Reducer::GeometricMean,
            "harmonicmean" => Reducer::HarmonicMean,
            "interquartilerange" => Reducer::InterquartileRange,
            "medianabsolutedeviation" => Reducer::MedianAbsoluteDeviation,
            "mode" => Reducer::Mode,
            "rootmeansquare" => Reducer::RootMeanSquare,
            "samplekurtosis" => Reducer::SampleKurtosis,
            "sampleskewness" => Reducer::SampleSkewness,
            "samplestandarddeviation" => Reducer::SampleStandardDeviation,
            "standarddeviation" => Reducer::StandardDeviation,
            "variance" => Reducer::Variance,
            other => {
                log::debug!("Unknown reducer '{}', using mean", other);
                Reducer::Mean
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Reducer::Mean => "mean",
            Reducer::Median => "median",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Sum => "sum",
            Reducer::Product => "product",
            Reducer::UniqueCount => "uniqueCount",
            Reducer::GeometricMean => "geometricMean",
            Reducer::HarmonicMean => "harmonicMean",
            Reducer::InterquartileRange => "interquartileRange",
            Reducer::MedianAbsoluteDeviation => "medianAbsoluteDeviation",
            Reducer::Mode => "mode",
            Reducer::RootMeanSquare => "rootMeanSquare",
            Reducer::SampleKurtosis => "sampleKurtosis",
            Reducer::SampleSkewness => "sampleSkewness",
            Reducer::SampleStandardDeviation => "sampleStandardDeviation",
            Reducer::StandardDeviation => "standardDeviation",
            Reducer::Variance => "variance",
        }
    }

    /// Applies the reducer; an empty input yields `NaN`
    pub fn apply(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }

        match self {
            Reducer::Mean => mean(values),
            Reducer::Median => quantile(&sorted(values), 0.5),
            Reducer::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Reducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Reducer::Sum => values.iter().sum(),
            Reducer::Product => values.iter().product(),
            Reducer::UniqueCount => unique_count(values),
            Reducer::GeometricMean => geometric_mean(values),
            Reducer::HarmonicMean => {
                values.len() as f64 / values.iter().map(|v| 1.0 / v).sum::<f64>()
            }
            Reducer::InterquartileRange => {
                let sorted = sorted(values);
                quantile(&sorted, 0.75) - quantile(&sorted, 0.25)
            }
            Reducer::MedianAbsoluteDeviation => {
                let median = quantile(&sorted(values), 0.5);
                let deviations: Vec<f64> = values.iter().map(|v| (v - median).abs()).collect();
                quantile(&sorted(&deviations), 0.5)
            }
            Reducer::Mode => mode(values),
            Reducer::RootMeanSquare => {
                (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
            }
            Reducer::SampleKurtosis => sample_kurtosis(values),
            Reducer::SampleSkewness => sample_skewness(values),
            Reducer::SampleStandardDeviation => sample_variance(values).sqrt(),
            Reducer::StandardDeviation => variance(values).sqrt(),
            Reducer::Variance => variance(values),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut copy = values.to_vec();
    copy.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    copy
}

/// Quantile of an already sorted, non-empty slice
///
/// Even-sized inputs average the two middle candidates when `len * p` lands
/// exactly on an index, so the median of `[1, 2, 3, 4]` is `2.5`.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let len = sorted.len();
    let idx = len as f64 * p;

    if p >= 1.0 {
        sorted[len - 1]
    } else if p <= 0.0 {
        sorted[0]
    } else if idx.fract() != 0.0 {
        sorted[idx.ceil() as usize - 1]
    } else if len % 2 == 0 {
        let idx = idx as usize;
        (sorted[idx - 1] + sorted[idx]) / 2.0
    } else {
        sorted[idx as usize]
    }
}

fn unique_count(values: &[f64]) -> f64 {
    let sorted = sorted(values);
    let mut count = 0;
    let mut last: Option<f64> = None;
    for value in sorted {
        if last != Some(value) {
            count += 1;
            last = Some(value);
        }
    }
    count as f64
}

fn geometric_mean(values: &[f64]) -> f64 {
    if values.iter().any(|v| *v < 0.0) {
        return f64::NAN;
    }
    (values.iter().map(|v| v.ln()).sum::<f64>() / values.len() as f64).exp()
}

/// Most frequent value; ties resolve to the smallest value
fn mode(values: &[f64]) -> f64 {
    let sorted = sorted(values);
    let mut best = sorted[0];
    let mut best_count = 0;
    let mut current = sorted[0];
    let mut current_count = 0;

    for value in sorted {
        if value == current {
            current_count += 1;
        } else {
            current = value;
            current_count = 1;
        }
        if current_count > best_count {
            best = current;
            best_count = current_count;
        }
    }

    best
}

fn variance(values: &[f64]) -> f64 {
    let mean = mean(values);
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let mean = mean(values);
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

fn sample_skewness(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 3 {
        return f64::NAN;
    }
    let mean = mean(values);
    let (squared, cubed) = values.iter().fold((0.0, 0.0), |(sq, cu), v| {
        let d = v - mean;
        (sq + d * d, cu + d * d * d)
    });
    let sample_sd = (squared / (n - 1.0)).sqrt();
    (n * cubed) / ((n - 1.0) * (n - 2.0) * sample_sd.powi(3))
}

fn sample_kurtosis(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 4 {
        return f64::NAN;
    }
    let mean = mean(values);
    let (second, fourth) = values.iter().fold((0.0, 0.0), |(s, f), v| {
        let d = v - mean;
        (s + d * d, f + d.powi(4))
    });
    ((n - 1.0) / ((n - 2.0) * (n - 3.0)))
        * ((n * (n + 1.0) * fourth) / (second * second) - 3.0 * (n - 1.0))
}
