//! Frequency newtypes so that Hz and mel values cannot be mixed up.

use std::ops;

use crate::Float;

macro_rules! impl_scale_ops {
    ($t:ty) => {
        impl ops::Mul<Float> for $t {
            type Output = $t;

            fn mul(self, rhs: Float) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl ops::Mul<$t> for Float {
            type Output = $t;

            fn mul(self, rhs: $t) -> Self::Output {
                <$t>::from(self * rhs.0)
            }
        }

        impl ops::Div<Float> for $t {
            type Output = $t;

            fn div(self, rhs: Float) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl ops::Div<$t> for $t {
            type Output = Float;

            fn div(self, rhs: $t) -> Self::Output {
                self.0 / rhs.0
            }
        }

        impl ops::Sub<$t> for $t {
            type Output = $t;

            fn sub(self, rhs: $t) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl ops::Add<$t> for $t {
            type Output = $t;

            fn add(self, rhs: $t) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl From<$t> for Float {
            fn from(t: $t) -> Float {
                t.0
            }
        }

        impl From<Float> for $t {
            fn from(f: Float) -> Self {
                Self(f)
            }
        }
    };
}

/// Frequency in Hz.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
pub struct Freq(Float);

/// Frequency on the (natural log) mel scale.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
pub struct MelFreq(Float);

impl_scale_ops!(Freq);

impl_scale_ops!(MelFreq);

impl Freq {
    pub fn to_mel(self) -> MelFreq {
        MelFreq(1127.0 * (1.0 + self.0 / 700.0).ln())
    }

    pub fn min(self, other: Freq) -> Freq {
        Freq(self.0.min(other.0))
    }
}

impl MelFreq {
    pub fn to_freq(self) -> Freq {
        Freq(700.0 * ((self.0 / 1127.0).exp() - 1.0))
    }
}
