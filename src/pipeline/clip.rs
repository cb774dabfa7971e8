//! IQR outlier clipping.

/// Nearest-rank quantile of an ascending slice.
///
/// Returns an element of the slice, so clipping values beyond the fences
/// never moves the quartiles and the clip is idempotent.
pub fn quantile_nearest(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = (q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted.get(pos).copied()
}

/// `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]` over the present values.
pub fn iqr_bounds(values: &[Option<f64>]) -> Option<(f64, f64)> {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    present.sort_by(f64::total_cmp);
    let q1 = quantile_nearest(&present, 0.25)?;
    let q3 = quantile_nearest(&present, 0.75)?;
    let iqr = q3 - q1;
    Some((q1 - 1.5 * iqr, q3 + 1.5 * iqr))
}

/// Clip a whole column in place; returns how many values moved.
pub fn clip_column(values: &mut [Option<f64>]) -> usize {
    let Some((lower, upper)) = iqr_bounds(values) else {
        return 0;
    };
    let mut moved = 0;
    for v in values.iter_mut().flatten() {
        let c = v.clamp(lower, upper);
        if c != *v {
            *v = c;
            moved += 1;
        }
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extremes_are_clipped_to_fences() {
        let mut vals: Vec<Option<f64>> = (1..=20).map(|x| Some(x as f64)).collect();
        vals.push(Some(1000.0));
        vals.push(None);
        let (lo, hi) = iqr_bounds(&vals).unwrap();
        let moved = clip_column(&mut vals);
        assert_eq!(moved, 1);
        assert_eq!(vals[20], Some(hi));
        assert!(lo < 1.0);
        assert_eq!(vals[21], None);
    }

    #[test]
    fn test_clipping_is_idempotent() {
        let mut vals: Vec<Option<f64>> = vec![0.0, 0.0, 0.0, 100.0, -50.0, 3.0, 2.0, 400.0]
            .into_iter()
            .map(Some)
            .collect();
        clip_column(&mut vals);
        let once = vals.clone();
        let moved = clip_column(&mut vals);
        assert_eq!(moved, 0);
        assert_eq!(vals, once);
    }

    #[test]
    fn test_all_missing_column_untouched() {
        let mut vals = vec![None, None];
        assert_eq!(clip_column(&mut vals), 0);
        assert_eq!(quantile_nearest(&[], 0.5), None);
    }
}
