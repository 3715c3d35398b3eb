//! Interpolation strategies for filling empty slots
//!
//! All strategies except [`Interpolator::None`] share the same frame: the
//! result is pre-filled with the first relevant value, the segments between
//! adjacent coordinates are filled by the concrete algorithm, and everything
//! after the last coordinate repeats its value.
//!
//! Segment algorithms see four control points. Where a real neighbour is
//! missing at either end of the sequence a padding point is extrapolated
//! linearly from the segment itself.

use super::windows::Coordinate;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interpolator {
    StepAfter,
    StepBefore,
    StepMiddle,
    Linear,
    Cosine,
    Cubic,
    CatmullRom,
    Hermite { tension: f64, bias: f64 },
    /// Passes through the in-window values without filling gaps
    None,
}

impl Interpolator {
    /// Resolves an interpolator by name, falling back to [`Interpolator::StepAfter`]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "catmullrom" => Interpolator::CatmullRom,
            "cosine" => Interpolator::Cosine,
            "cubic" => Interpolator::Cubic,
            "hermitelowtension" => Interpolator::Hermite {
                tension: -1.0,
                bias: 0.0,
            },
            "hermitenormaltension" => Interpolator::Hermite {
                tension: 0.0,
                bias: 0.0,
            },
            "hermitehightension" => Interpolator::Hermite {
                tension: 1.0,
                bias: 0.0,
            },
            "linear" => Interpolator::Linear,
            "none" => Interpolator::None,
            "stepbefore" => Interpolator::StepBefore,
            "stepmiddle" => Interpolator::StepMiddle,
            "stepafter" => Interpolator::StepAfter,
            other => {
                log::debug!("Unknown interpolation '{}', using stepAfter", other);
                Interpolator::StepAfter
            }
        }
    }

    /// Builds a series of `number_of_slots` values from sparse coordinates
    ///
    /// Coordinates with `x < 0` only contribute the starting value. With
    /// [`Interpolator::None`] the result holds just the in-window values and
    /// its length may differ from `number_of_slots`.
    pub fn interpolate(
        &self,
        coordinates: &[Coordinate],
        number_of_slots: usize,
    ) -> Vec<Option<f64>> {
        if let Interpolator::None = self {
            return coordinates
                .iter()
                .filter(|coordinate| coordinate.x >= 0)
                .map(|coordinate| Some(coordinate.y))
                .collect();
        }

        if coordinates.is_empty() {
            return vec![None; number_of_slots];
        }

        let mut start_index = 0;
        let mut first_y = coordinates[0].y;
        for (index, coordinate) in coordinates.iter().enumerate() {
            if coordinate.x < 0 {
                first_y = coordinate.y;
            } else {
                start_index = index;
                break;
            }
        }

        let mut result = vec![Some(first_y); number_of_slots];
        if coordinates.len() == 1 || number_of_slots == 0 {
            return result;
        }

        self.fill_holes(start_index.saturating_sub(1), coordinates, &mut result);

        if let Some(last) = coordinates.last() {
            let from = last.x.max(0) as usize;
            for slot in result.iter_mut().skip(from) {
                *slot = Some(last.y);
            }
        }

        result
    }

    /// Fills every slot between adjacent coordinates starting at `start_index`
    fn fill_holes(
        &self,
        start_index: usize,
        coordinates: &[Coordinate],
        result: &mut [Option<f64>],
    ) {
        let last_slot = result.len() as i64 - 1;

        for index in start_index..coordinates.len() - 1 {
            let c1 = coordinates[index];
            let c2 = coordinates[index + 1];
            let width = c2.x - c1.x;
            if width <= 0 {
                continue;
            }

            let c0 = if index > 0 {
                coordinates[index - 1]
            } else {
                Coordinate::new(c1.x - width, c1.y - (c2.y - c1.y))
            };
            let c3 = if index + 2 < coordinates.len() {
                coordinates[index + 2]
            } else {
                Coordinate::new(c2.x + width, c2.y + (c2.y - c1.y))
            };

            for x in c1.x.max(0)..=c2.x.min(last_slot) {
                let mu = (x - c1.x) as f64 / width as f64;
                result[x as usize] = Some(self.calculate_value(&c0, &c1, &c2, &c3, mu));
            }
        }
    }

    /// Value between `c1` and `c2` at fractional position `mu`
    fn calculate_value(
        &self,
        c0: &Coordinate,
        c1: &Coordinate,
        c2: &Coordinate,
        c3: &Coordinate,
        mu: f64,
    ) -> f64 {
        let (y0, y1, y2, y3) = (c0.y, c1.y, c2.y, c3.y);

        match *self {
            Interpolator::StepAfter => {
                if mu >= 1.0 {
                    y2
                } else {
                    y1
                }
            }
            Interpolator::StepBefore => {
                if mu <= 0.0 {
                    y1
                } else {
                    y2
                }
            }
            Interpolator::StepMiddle => {
                if mu < 0.5 {
                    y1
                } else {
                    y2
                }
            }
            Interpolator::Linear => y1 * (1.0 - mu) + y2 * mu,
            Interpolator::Cosine => {
                let mu2 = (1.0 - (mu * PI).cos()) / 2.0;
                y1 * (1.0 - mu2) + y2 * mu2
            }
            Interpolator::Cubic => {
                let mu2 = mu * mu;
                let a0 = y3 - y2 - y0 + y1;
                let a1 = y0 - y1 - a0;
                let a2 = y2 - y0;
                let a3 = y1;
                a0 * mu * mu2 + a1 * mu2 + a2 * mu + a3
            }
            Interpolator::CatmullRom => {
                let mu2 = mu * mu;
                let a0 = -0.5 * y0 + 1.5 * y1 - 1.5 * y2 + 0.5 * y3;
                let a1 = y0 - 2.5 * y1 + 2.0 * y2 - 0.5 * y3;
                let a2 = -0.5 * y0 + 0.5 * y2;
                let a3 = y1;
                a0 * mu * mu2 + a1 * mu2 + a2 * mu + a3
            }
            Interpolator::Hermite { tension, bias } => {
                let mu2 = mu * mu;
                let mu3 = mu2 * mu;
                let m0 = (y1 - y0) * (1.0 + bias) * (1.0 - tension) / 2.0
                    + (y2 - y1) * (1.0 - bias) * (1.0 - tension) / 2.0;
                let m1 = (y2 - y1) * (1.0 + bias) * (1.0 - tension) / 2.0
                    + (y3 - y2) * (1.0 - bias) * (1.0 - tension) / 2.0;
                let a0 = 2.0 * mu3 - 3.0 * mu2 + 1.0;
                let a1 = mu3 - 2.0 * mu2 + mu;
                let a2 = mu3 - mu2;
                let a3 = -2.0 * mu3 + 3.0 * mu2;
                a0 * y1 + a1 * m0 + a2 * m1 + a3 * y2
            }
            // handled in interpolate()
            Interpolator::None => y1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(series: Vec<Option<f64>>) -> Vec<f64> {
        series.into_iter().map(|v| v.expect("slot left empty")).collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_step_after() {
        // Test: [(0,10),(2,20)] over 4 slots → [10,10,20,20]
        let coordinates = [Coordinate::new(0, 10.0), Coordinate::new(2, 20.0)];
        let result = values(Interpolator::StepAfter.interpolate(&coordinates, 4));
        assert_eq!(result, vec![10.0, 10.0, 20.0, 20.0]);
    }

    #[test]
    fn test_step_before_and_middle() {
        let coordinates = [Coordinate::new(0, 10.0), Coordinate::new(4, 20.0)];
        let before = values(Interpolator::StepBefore.interpolate(&coordinates, 5));
        assert_eq!(before, vec![10.0, 20.0, 20.0, 20.0, 20.0]);

        let middle = values(Interpolator::StepMiddle.interpolate(&coordinates, 5));
        assert_eq!(middle, vec![10.0, 10.0, 20.0, 20.0, 20.0]);
    }

    #[test]
    fn test_linear() {
        // Test: [(0,0),(2,10)] → value 5 at x=1
        let coordinates = [Coordinate::new(0, 0.0), Coordinate::new(2, 10.0)];
        let result = values(Interpolator::Linear.interpolate(&coordinates, 4));
        assert_eq!(result, vec![0.0, 5.0, 10.0, 10.0]);
    }

    #[test]
    fn test_cosine_midpoint() {
        let coordinates = [Coordinate::new(0, 0.0), Coordinate::new(2, 10.0)];
        let result = values(Interpolator::Cosine.interpolate(&coordinates, 3));
        assert!(approx(result[1], 5.0));
        assert!(approx(result[2], 10.0));
    }

    #[test]
    fn test_splines_reproduce_straight_lines() {
        // Linear padding keeps every spline on a straight line through collinear points
        let coordinates = [
            Coordinate::new(0, 0.0),
            Coordinate::new(2, 2.0),
            Coordinate::new(4, 4.0),
        ];
        for interpolator in [
            Interpolator::CatmullRom,
            Interpolator::Cubic,
            Interpolator::from_name("hermiteNormalTension"),
        ] {
            let result = values(interpolator.interpolate(&coordinates, 5));
            for (x, y) in result.iter().enumerate() {
                assert!(approx(*y, x as f64), "{:?} at {} = {}", interpolator, x, y);
            }
        }
    }

    #[test]
    fn test_history_coordinate_sets_left_edge() {
        // Test: a history coordinate (x<0) is interpolated into the window
        let coordinates = [Coordinate::new(-2, 0.0), Coordinate::new(2, 40.0)];
        let result = values(Interpolator::Linear.interpolate(&coordinates, 4));
        assert_eq!(result, vec![20.0, 30.0, 40.0, 40.0]);
    }

    #[test]
    fn test_only_history_coordinates() {
        // Edge case: all coordinates left of the window → last history value everywhere
        let coordinates = [Coordinate::new(-3, 1.0), Coordinate::new(-1, 7.0)];
        let result = values(Interpolator::Linear.interpolate(&coordinates, 3));
        assert_eq!(result, vec![7.0, 7.0, 7.0]);
    }

    #[test]
    fn test_single_coordinate_fills_window() {
        let coordinates = [Coordinate::new(3, 8.0)];
        let result = values(Interpolator::CatmullRom.interpolate(&coordinates, 5));
        assert_eq!(result, vec![8.0; 5]);
    }

    #[test]
    fn test_empty_coordinates() {
        // Edge case: no coordinates → window of nulls (none → empty)
        assert_eq!(Interpolator::Linear.interpolate(&[], 3), vec![None, None, None]);
        assert!(Interpolator::None.interpolate(&[], 3).is_empty());
    }

    #[test]
    fn test_none_passes_in_window_values() {
        // Test: none ignores history and the window size
        let coordinates = [
            Coordinate::new(-1, 1.0),
            Coordinate::new(0, 2.0),
            Coordinate::new(5, 3.0),
        ];
        let result = Interpolator::None.interpolate(&coordinates, 10);
        assert_eq!(result, vec![Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_unknown_name_falls_back_to_step_after() {
        assert_eq!(Interpolator::from_name("bogus"), Interpolator::StepAfter);
        assert_eq!(Interpolator::from_name("catmullRom"), Interpolator::CatmullRom);
        assert_eq!(
            Interpolator::from_name("hermiteLowTension"),
            Interpolator::Hermite {
                tension: -1.0,
                bias: 0.0
            }
        );
    }
}
