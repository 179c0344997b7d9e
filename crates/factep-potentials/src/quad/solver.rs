//! Bracketed one-dimensional Newton root finding.
//!
//! Contract: `f` returns `(value, derivative)`; a root is bracketed and
//! then polished with Newton steps that fall back to bisection whenever a
//! step would leave the bracket. Termination when either the bracket
//! shrinks below `acc` or the function value drops below `facc`. With no
//! right bracket end the search walks right with growing Newton-informed
//! steps, which finds a bracket whenever `f` is increasing right of `l`
//! with a sign change somewhere (the convex proximal criteria used here).

const MAX_ITER: usize = 100;

pub fn newton_solve(
    f: &mut dyn FnMut(f64) -> (f64, f64),
    l: f64,
    r: Option<f64>,
    acc: f64,
    facc: f64,
) -> Option<f64> {
    let (fl, _) = f(l);
    if !fl.is_finite() {
        return None;
    }
    if fl.abs() < facc {
        return Some(l);
    }

    // Establish a bracket [lo, hi] with f(lo) and f(hi) of opposite sign.
    let (mut lo, mut hi, mut flo, mut fhi);
    let searching_right = fl < 0.0;
    let mut x = l;
    let mut fx = fl;
    let mut step = match r {
        Some(r) if (r - l).abs() > 0.0 => (r - l).abs(),
        _ => acc.max(0.5),
    };
    if let Some(r) = r {
        let (fr, _) = f(r);
        if !fr.is_finite() {
            return None;
        }
        if fr.abs() < facc {
            return Some(r);
        }
        if fl.signum() != fr.signum() {
            (lo, hi, flo, fhi) = if l < r { (l, r, fl, fr) } else { (r, l, fr, fl) };
        } else {
            // The supplied end does not bracket; fall back to searching in
            // the direction the sign demands.
            (lo, hi, flo, fhi) = expand_bracket(f, x, fx, step, searching_right)?;
        }
    } else {
        loop {
            // Walk right while the sign persists, preferring Newton-sized
            // steps once they exceed the raw step.
            let cand = x + if searching_right { step } else { -step };
            let (fc, dfc) = f(cand);
            if !fc.is_finite() {
                return None;
            }
            if fc.abs() < facc {
                return Some(cand);
            }
            if fc.signum() != fx.signum() {
                (lo, hi, flo, fhi) = if x < cand {
                    (x, cand, fx, fc)
                } else {
                    (cand, x, fc, fx)
                };
                break;
            }
            x = cand;
            fx = fc;
            let newton = if dfc > 0.0 { -fc / dfc } else { 0.0 };
            step = if searching_right && newton > step {
                newton
            } else {
                step * 2.0
            };
            if step > 1e12 {
                return None;
            }
        }
    }

    // Polish: Newton inside the bracket, bisection otherwise.
    debug_assert!(flo.signum() != fhi.signum());
    let _ = fhi;
    let mut x = 0.5 * (lo + hi);
    for _ in 0..MAX_ITER {
        let (fx, dfx) = f(x);
        if !fx.is_finite() {
            return None;
        }
        if fx.abs() < facc || hi - lo < acc {
            return Some(x);
        }
        if fx.signum() == flo.signum() {
            lo = x;
            flo = fx;
        } else {
            hi = x;
        }
        let newton = if dfx != 0.0 { x - fx / dfx } else { lo - 1.0 };
        x = if newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }
    Some(x)
}

fn expand_bracket(
    f: &mut dyn FnMut(f64) -> (f64, f64),
    mut x: f64,
    mut fx: f64,
    mut step: f64,
    searching_right: bool,
) -> Option<(f64, f64, f64, f64)> {
    for _ in 0..MAX_ITER {
        let cand = if searching_right { x + step } else { x - step };
        let (fc, _) = f(cand);
        if !fc.is_finite() {
            return None;
        }
        if fc.signum() != fx.signum() {
            return if x < cand {
                Some((x, cand, fx, fc))
            } else {
                Some((cand, x, fc, fx))
            };
        }
        x = cand;
        fx = fc;
        step *= 2.0;
        if step > 1e12 {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracketed_root() {
        // f(x) = x^3 - 2, root 2^(1/3).
        let mut f = |x: f64| (x * x * x - 2.0, 3.0 * x * x);
        let root = newton_solve(&mut f, 0.0, Some(2.0), 1e-12, 1e-14).unwrap();
        assert!((root - 2f64.powf(1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_automatic_right_end() {
        // f(x) = e^x + x - 5, increasing; start left of the root.
        let mut f = |x: f64| (x.exp() + x - 5.0, x.exp() + 1.0);
        let root = newton_solve(&mut f, -10.0, None, 1e-12, 1e-13).unwrap();
        assert!((root.exp() + root - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_left_search_when_start_is_right_of_root() {
        let mut f = |x: f64| (x - 1.0, 1.0);
        let root = newton_solve(&mut f, 4.0, Some(5.0), 1e-12, 1e-14).unwrap();
        assert!((root - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_root_fails_cleanly() {
        let mut f = |x: f64| (x.exp(), x.exp());
        assert!(newton_solve(&mut f, 0.0, None, 1e-10, 1e-12).is_none());
    }
}
