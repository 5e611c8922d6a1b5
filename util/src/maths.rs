//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
///
/// This is a pure linear interpolation, values outside of `source_range` are extrapolated rather
/// than clamped. `source_range` must not be degenerate (`source_range.0 != source_range.1`).
///
/// The ends of `source_range` map exactly onto the ends of `target_range`.
pub fn map_range<T>(value: T, source_range: (T, T), target_range: (T, T)) -> T
where
    T: Float
{
    let t = (value - source_range.0) / (source_range.1 - source_range.0);

    target_range.0 * (T::one() - t) + target_range.1 * t
}

/// Return the euclidian norm of a 2D vector.
pub fn norm_2d<T>(x: T, y: T) -> T
where
    T: Float
{
    (x.powi(2) + y.powi(2)).sqrt()
}

/// Returns true if `value` lies strictly between the bounds of `band`.
pub fn in_open_band<T>(value: T, band: (T, T)) -> bool
where
    T: Float
{
    value > band.0 && value < band.1
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_map_range_endpoints() {
        let ranges = [
            ((0f64, 500f64), (1500f64, 1700f64)),
            ((0f64, 2000f64), (1400f64, 1600f64)),
            ((-1f64, 1f64), (1900f64, 1100f64)),
            ((0f64, 2000f64), (0f64, 1200f64)),
            ((0f64, 500f64), (5f64, 50f64)),
            ((3.5f64, -7.25f64), (0.1f64, 0.3f64)),
            ((-7.31f64, 6.95f64), (5.28f64, -4.9f64)),
            ((0.1f64, 0.7f64), (-0.3f64, 1e6f64)),
        ];

        for (src, tgt) in ranges.iter() {
            assert_eq!(map_range(src.0, *src, *tgt), tgt.0);
            assert_eq!(map_range(src.1, *src, *tgt), tgt.1);
        }
    }

    #[test]
    fn test_map_range_is_linear() {
        assert_eq!(map_range(250f64, (0.0, 500.0), (1500.0, 1700.0)), 1600.0);
        // No clamping outside of the source range
        assert_eq!(map_range(750f64, (0.0, 500.0), (1500.0, 1700.0)), 1800.0);
        assert_eq!(map_range(-250f64, (0.0, 500.0), (1500.0, 1700.0)), 1400.0);
    }

    #[test]
    fn test_norm_2d() {
        assert_eq!(norm_2d(3f64, 4f64), 5f64);
        assert_eq!(norm_2d(0f64, 0f64), 0f64);
    }

    #[test]
    fn test_in_open_band() {
        assert!(in_open_band(3.9, (3.7, 4.1)));
        assert!(!in_open_band(3.7, (3.7, 4.1)));
        assert!(!in_open_band(4.2, (3.7, 4.1)));
    }
}
