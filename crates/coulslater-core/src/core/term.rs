use super::precision::Real;
use std::ops::{Add, AddAssign};

/// Six-component virial in `xx, yy, zz, xy, xz, yz` order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Virial<A> {
    pub v: [A; 6],
}

impl<A: Real> Virial<A> {
    /// Contribution `del (x) del * fpair` of one pair.
    #[inline]
    pub fn of_pair(del: [A; 3], fpair: A) -> Self {
        let [dx, dy, dz] = del;
        Self {
            v: [
                dx * dx * fpair,
                dy * dy * fpair,
                dz * dz * fpair,
                dx * dy * fpair,
                dx * dz * fpair,
                dy * dz * fpair,
            ],
        }
    }

    pub fn scaled(self, factor: A) -> Self {
        Self {
            v: self.v.map(|x| x * factor),
        }
    }

    /// Trace, i.e. the scalar virial `xx + yy + zz`.
    pub fn trace(&self) -> A {
        self.v[0] + self.v[1] + self.v[2]
    }
}

impl<A: Real> Add for Virial<A> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl<A: Real> AddAssign for Virial<A> {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.v.iter_mut().zip(rhs.v) {
            *a += b;
        }
    }
}

/// Global Coulomb energy and virial of a step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnergyTerm {
    pub ecoul: f64,
    pub virial: [f64; 6],
}

impl EnergyTerm {
    pub fn new(ecoul: f64, virial: [f64; 6]) -> Self {
        Self { ecoul, virial }
    }

    pub fn pressure_trace(&self) -> f64 {
        self.virial[0] + self.virial[1] + self.virial[2]
    }
}

impl Add for EnergyTerm {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign for EnergyTerm {
    fn add_assign(&mut self, rhs: Self) {
        self.ecoul += rhs.ecoul;
        for (a, b) in self.virial.iter_mut().zip(rhs.virial) {
            *a += b;
        }
    }
}
