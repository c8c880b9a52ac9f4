use std::iter::Sum;

/// Radiometric RGB triple carried by a single ray sample. Single precision:
/// per-sample values are short-lived and their round-off does not compound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub fn new(r: f32, g: f32, b: f32) -> Color {
        Color { r, g, b }
    }
    pub fn black() -> Color {
        Color::new(0.0, 0.0, 0.0)
    }
    pub fn gray(level: f32) -> Color {
        Color::new(level, level, level)
    }
    pub const ONE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };
    pub fn is_black(&self) -> bool {
        self.r <= 0.0 && self.g <= 0.0 && self.b <= 0.0
    }
    /// Returns true iff all RGB components are finite and free of NaNs.
    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }
}

impl std::ops::Add for Color {
    type Output = Color;
    fn add(self, rhs: Self) -> Self {
        Color::new(self.r + rhs.r, self.g + rhs.g, self.b + rhs.b)
    }
}

impl std::ops::AddAssign for Color {
    fn add_assign(&mut self, rhs: Self) {
        self.r += rhs.r;
        self.g += rhs.g;
        self.b += rhs.b;
    }
}

impl std::ops::Mul<f32> for Color {
    type Output = Color;
    fn mul(self, s: f32) -> Self {
        Color::new(self.r * s, self.g * s, self.b * s)
    }
}

impl std::ops::Mul<Color> for f32 {
    type Output = Color;
    fn mul(self, c: Color) -> Color {
        c * self
    }
}

impl std::ops::Mul for Color {
    type Output = Color;
    fn mul(self, rhs: Color) -> Self::Output {
        Color::new(self.r * rhs.r, self.g * rhs.g, self.b * rhs.b)
    }
}

impl Sum for Color {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Color::black(), |c0, c1| c0 + c1)
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let precision = f.precision().unwrap_or(2);
        write!(
            f,
            "rgb({:.precision$}, {:.precision$}, {:.precision$})",
            self.r,
            self.g,
            self.b,
            precision = precision
        )
    }
}

/// Double-precision accumulation triple. One accumulator bin may sum millions
/// of single-precision samples; the wider running sum keeps the round-off of
/// the total bounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl DColor {
    pub fn zero() -> DColor {
        DColor {
            r: 0.0,
            g: 0.0,
            b: 0.0,
        }
    }

    pub fn add_sample(&mut self, c: Color) {
        self.r += c.r as f64;
        self.g += c.g as f64;
        self.b += c.b as f64;
    }

    pub fn is_zero(&self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }

    /// Narrows the accumulated total back to a sample triple.
    pub fn as_color(&self) -> Color {
        Color::new(self.r as f32, self.g as f32, self.b as f32)
    }
}

impl std::ops::Add for DColor {
    type Output = DColor;
    fn add(self, rhs: Self) -> Self {
        DColor {
            r: self.r + rhs.r,
            g: self.g + rhs.g,
            b: self.b + rhs.b,
        }
    }
}

impl std::ops::AddAssign for DColor {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_samples_in_double_precision() {
        let mut bin = DColor::zero();
        for _ in 0..1000 {
            bin.add_sample(Color::new(0.1, 0.2, 0.3));
        }
        assert!((bin.r - 100.0).abs() < 1e-3);
        assert!((bin.g - 200.0).abs() < 1e-3);
        assert!((bin.b - 300.0).abs() < 1e-3);
    }

    #[test]
    fn black_detection() {
        assert!(Color::black().is_black());
        assert!(!Color::ONE.is_black());
        assert!(DColor::zero().is_zero());
    }
}
