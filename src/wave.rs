// syn.txt -- a text based synthesizer and audio workstation
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Sampled audio data.

use std::ops;

/// A block of interleavable stereo samples, as passed between graph nodes.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    samples: Vec<Stereo<f64>>,
}

#[allow(clippy::len_without_is_empty)]
impl AudioBuffer {
    pub fn new(sample_count: usize) -> Self {
        Self {
            samples: vec![Stereo::mono(0.0); sample_count],
        }
    }

    pub fn fill_zero(&mut self) {
        self.samples
            .iter_mut()
            .for_each(|s| *s = Stereo::mono(0.0));
    }

    /// Size of the buffer in samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Size of the buffer in bytes once written as `f64` pairs.
    pub fn byte_len(&self) -> usize {
        self.len() * 2 * std::mem::size_of::<f64>()
    }

    pub fn samples(&self) -> &[Stereo<f64>] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [Stereo<f64>] {
        &mut self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stereo<f64>> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Stereo<f64>> {
        self.samples.iter_mut()
    }

    /// Largest absolute sample value on either channel.
    pub fn peak(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.left.abs().max(s.right.abs()))
            .fold(0.0, f64::max)
    }

    /// Write the samples as little endian `f64`, left before right.
    /// Returns the number of samples that fit into `bytes`.
    pub fn copy_bytes_to(&self, bytes: &mut [u8]) -> usize {
        let mut processed = 0;
        for (sample, target) in self.samples.iter().zip(bytes.chunks_exact_mut(16)) {
            target[0..8].copy_from_slice(&sample.left.to_le_bytes());
            target[8..16].copy_from_slice(&sample.right.to_le_bytes());
            processed += 1;
        }
        processed
    }
}

/// A pair of values for the left and right channel.
///
/// ```
/// use syn_score::wave::*;
///
/// let mut s = Stereo::new(0.25, 0.5);
/// s += Stereo::mono(0.25);
/// assert_eq!(s * 2.0, Stereo::new(1.0, 1.5));
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Stereo<T> {
    pub left: T,
    pub right: T,
}

impl<T> Stereo<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn mono(mono: T) -> Self
    where
        T: Copy,
    {
        Self::new(mono, mono)
    }
}

impl Stereo<f64> {
    /// Spread a mono signal by attenuating the channel opposite to `pan`,
    /// where -1.0 is hard left and 1.0 hard right.
    ///
    /// ```
    /// # use syn_score::wave::*;
    /// assert_eq!(Stereo::panned_mono(1.0, 0.0), Stereo::new(1.0, 1.0));
    /// assert_eq!(Stereo::panned_mono(1.0, -1.0), Stereo::new(1.0, 0.0));
    /// assert_eq!(Stereo::panned_mono(1.0, 0.5), Stereo::new(0.5, 1.0));
    /// ```
    pub fn panned_mono(mono: f64, pan: f64) -> Self {
        Stereo::new(mono * 1.0f64.min(1.0 - pan), mono * 1.0f64.min(1.0 + pan))
    }

    /// Balance an existing stereo signal the same way as `panned_mono`.
    pub fn panned(self, pan: f64) -> Self {
        Stereo::new(
            self.left * 1.0f64.min(1.0 - pan),
            self.right * 1.0f64.min(1.0 + pan),
        )
    }
}

impl<T: ops::Add> ops::Add for Stereo<T> {
    type Output = Stereo<T::Output>;

    fn add(self, rhs: Self) -> Self::Output {
        Stereo {
            left: self.left + rhs.left,
            right: self.right + rhs.right,
        }
    }
}

impl<T: ops::AddAssign> ops::AddAssign for Stereo<T> {
    fn add_assign(&mut self, rhs: Self) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl<T: ops::Mul + Copy> ops::Mul<T> for Stereo<T> {
    type Output = Stereo<T::Output>;

    fn mul(self, rhs: T) -> Self::Output {
        Stereo {
            left: self.left * rhs,
            right: self.right * rhs,
        }
    }
}

impl<T: ops::MulAssign + Copy> ops::MulAssign<T> for Stereo<T> {
    fn mul_assign(&mut self, rhs: T) {
        self.left *= rhs;
        self.right *= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_interleaved() {
        let mut buffer = AudioBuffer::new(2);
        buffer.samples_mut()[0] = Stereo::new(1.0, -1.0);
        buffer.samples_mut()[1] = Stereo::new(0.5, 0.25);

        let mut bytes = vec![0; buffer.byte_len()];
        assert_eq!(buffer.copy_bytes_to(&mut bytes), 2);
        assert_eq!(&bytes[0..8], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[8..16], &(-1.0f64).to_le_bytes());
        assert_eq!(&bytes[24..32], &0.25f64.to_le_bytes());

        let mut short = vec![0; 20];
        assert_eq!(buffer.copy_bytes_to(&mut short), 1);
    }

    #[test]
    fn peak_and_reset() {
        let mut buffer = AudioBuffer::new(3);
        buffer.samples_mut()[1] = Stereo::new(0.1, -0.75);
        assert_eq!(buffer.peak(), 0.75);
        buffer.fill_zero();
        assert_eq!(buffer.peak(), 0.0);
    }
}
