use super::{Interval, QuadPotential, newton_solve, proximal_newton};
use factep_core::specfun;
use factep_error::{EpResult, require};

/// Poisson count potential with exponential rate
///
/// ```text
/// t(s) = (y!)^-1 lam(s)^y exp(-lam(s)),   lam(s) = exp(s)
/// ```
///
/// Parameter: `y` (nonnegative integer). `l(s)` is smooth on all of R and
/// the proximal map reduces to the root of `e^x + x - a`, solved with a
/// closed-form initial bracket.
pub struct PoissonExpRate {
    y: f64,
    log_y_fact: f64,
    acc: f64,
    facc: f64,
}

fn valid_count(y: f64) -> bool {
    y >= 0.0 && y.fract() == 0.0 && y.is_finite()
}

impl PoissonExpRate {
    pub fn new(y: f64) -> EpResult<Self> {
        require!(valid_count(y), InvalidParameter: "Poisson count {} must be a nonnegative integer", y);
        Ok(PoissonExpRate {
            y,
            log_y_fact: specfun::ln_gamma(y + 1.0),
            acc: 1e-7,
            facc: 1e-7,
        })
    }
}

impl QuadPotential for PoissonExpRate {
    fn num_pars(&self) -> usize {
        1
    }

    fn get_pars(&self, pv: &mut [f64]) {
        pv[0] = self.y;
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        require!(self.is_valid_pars(pv), InvalidParameter: "Poisson count {} must be a nonnegative integer", pv[0]);
        self.y = pv[0];
        self.log_y_fact = specfun::ln_gamma(pv[0] + 1.0);
        Ok(())
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        valid_count(pv[0])
    }

    fn is_log_concave(&self) -> bool {
        true
    }

    fn eval(&self, s: f64) -> f64 {
        s.exp() - s * self.y + self.log_y_fact
    }

    fn eval_grad(&self, s: f64) -> (f64, f64, f64) {
        let lam = s.exp();
        (lam - s * self.y + self.log_y_fact, lam - self.y, lam)
    }

    fn interval(&self) -> (Interval, Vec<f64>) {
        (Interval::all(), Vec::new())
    }

    /// The stationarity condition in `x = s + log rho` reads
    /// `e^x + x = a` with `a = h + y rho + log rho`. For `a <= 1` the
    /// bracket `[a - e^a, a]` works; otherwise `[(1-u) log a, log a]` with
    /// `u = -log(1 - log(a)/a) / log(a)`.
    fn proximal(&self, h: f64, rho: f64) -> Option<f64> {
        if rho < 1e-16 {
            return None;
        }
        let a = h + self.y * rho + rho.ln();
        let (l, r) = if a <= 1.001 {
            (a - a.exp(), a)
        } else {
            let r = a.ln();
            (r + (-r / a).ln_1p(), r)
        };
        let mut f = |x: f64| (x.exp() + x - a, x.exp() + 1.0);
        let x = newton_solve(&mut f, l, (r > l).then_some(r), self.acc, self.facc)?;
        Some(x - rho.ln())
    }
}

/// Poisson count potential with logistic rate `lam(s) = log(1 + exp(s))`.
///
/// Parameter: `y` (nonnegative integer). The proximal map goes through the
/// generic Newton path with a bracket built from a short grid of logistic
/// anchor points.
pub struct PoissonLogisticRate {
    y: f64,
    log_y_fact: f64,
    acc: f64,
    facc: f64,
}

impl PoissonLogisticRate {
    pub fn new(y: f64) -> EpResult<Self> {
        require!(valid_count(y), InvalidParameter: "Poisson count {} must be a nonnegative integer", y);
        Ok(PoissonLogisticRate {
            y,
            log_y_fact: specfun::ln_gamma(y + 1.0),
            acc: 1e-7,
            facc: 1e-7,
        })
    }

    /// `(sigma(s), lam(s), sigma/lam)`, stable on both tails.
    fn rate_parts(s: f64) -> (f64, f64, f64) {
        if s >= 0.0 {
            let t = (-s).exp();
            let sig = 1.0 / (1.0 + t);
            let lam = s + t.ln_1p();
            (sig, lam, sig / lam)
        } else {
            let t = s.exp();
            let sig = t / (1.0 + t);
            let lam = t.ln_1p();
            // lam ~ t for very negative s, so sig/lam -> 1/(1 + t).
            let sgdlm = if s > -10.0 { sig / lam } else { 1.0 / (1.0 + t) };
            (sig, lam, sgdlm)
        }
    }
}

impl QuadPotential for PoissonLogisticRate {
    fn num_pars(&self) -> usize {
        1
    }

    fn get_pars(&self, pv: &mut [f64]) {
        pv[0] = self.y;
    }

    fn set_pars(&mut self, pv: &[f64]) -> EpResult<()> {
        require!(self.is_valid_pars(pv), InvalidParameter: "Poisson count {} must be a nonnegative integer", pv[0]);
        self.y = pv[0];
        self.log_y_fact = specfun::ln_gamma(pv[0] + 1.0);
        Ok(())
    }

    fn is_valid_pars(&self, pv: &[f64]) -> bool {
        valid_count(pv[0])
    }

    fn is_log_concave(&self) -> bool {
        true
    }

    fn eval(&self, s: f64) -> f64 {
        let (_, lam, _) = Self::rate_parts(s);
        if self.y > 0.0 {
            lam - self.y * lam.ln() + self.log_y_fact
        } else {
            lam
        }
    }

    fn eval_grad(&self, s: f64) -> (f64, f64, f64) {
        let (sig, _, sgdlm) = Self::rate_parts(s);
        let l = self.eval(s);
        let dl = sig - self.y * sgdlm;
        let omsig = 1.0 - sig;
        let ddl = sig * omsig + self.y * sgdlm * (sgdlm - omsig);
        (l, dl, ddl)
    }

    fn interval(&self) -> (Interval, Vec<f64>) {
        (Interval::all(), Vec::new())
    }

    fn proximal(&self, h: f64, rho: f64) -> Option<f64> {
        if rho < 1e-16 {
            return None;
        }
        let l = h - rho;
        let mut r = l;
        for &a in &[2.20_f64, 1.39, 0.85, 0.41, 0.0] {
            let sga = 1.0 / (1.0 + (-a).exp());
            r = h - sga * rho;
            if self.y > 0.0 {
                r = 0.5 * (r + (r * r + 4.0 * self.y * rho).sqrt());
            }
            if r > a {
                break;
            }
        }
        proximal_newton(self, h, rho, l, (r > l).then_some(r), self.acc, self.facc)
    }
}
