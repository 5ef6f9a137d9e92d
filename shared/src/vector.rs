use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

///Represents a vector in 2D space.
///
///Used both for positions on the field (metres) and for per-step
/// displacements (metres per step).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vector {
    ///Value along the x-axis, towards the SecondPlayer goal.
    pub x: f32,
    ///Value along the y-axis.
    pub y: f32,
}

impl Vector {
    pub const ZERO: Vector = Vector { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Vector { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the distance between two points.
    pub fn distance(&self, other: &Vector) -> f32 {
        (*other - *self).length()
    }

    pub fn dot(&self, other: &Vector) -> f32 {
        self.x * other.x + self.y * other.y
    }

    ///Returns the normalized vector, or zero for a zero vector.
    pub fn normalize(&self) -> Vector {
        let len = self.length();
        if len == 0.0 {
            Vector::ZERO
        } else {
            Vector {
                x: self.x / len,
                y: self.y / len,
            }
        }
    }

    ///Returns the vector rescaled to the given length, keeping its direction.
    pub fn with_length(&self, length: f32) -> Vector {
        self.normalize() * length
    }

    ///Returns the vector rotated counter-clockwise by `angle` radians.
    pub fn rotate(&self, angle: f32) -> Vector {
        let (sin, cos) = angle.sin_cos();
        Vector {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl Add for Vector {
    type Output = Vector;

    fn add(self, other: Vector) -> Vector {
        Vector {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Vector {
    type Output = Vector;

    fn sub(self, other: Vector) -> Vector {
        Vector {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Mul<f32> for Vector {
    type Output = Vector;

    fn mul(self, scalar: f32) -> Vector {
        Vector {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}
