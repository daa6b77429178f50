use arkhe_core::{ProjectionSettings, fold_angle};
use serde::{Deserialize, Serialize};

/// Smallest perspective denominator treated as in front of the camera.
pub const NEAR_EPSILON: f32 = 1.0e-3;

/// Euler angles in radians, applied as pitch (X), then yaw (Y), then roll (Z).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotation {
    #[must_use]
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Base tilt plus auto-rotation accumulated over `time`.
    #[must_use]
    pub fn at(time: f64, settings: &ProjectionSettings) -> Self {
        let [tilt_x, tilt_y, tilt_z] = settings.tilt;
        let [rate_x, rate_y, rate_z] = settings.rotation_rates;
        Self {
            pitch: tilt_x + fold_angle(rate_x, time),
            yaw: tilt_y + fold_angle(rate_y, time),
            roll: tilt_z + fold_angle(rate_z, time),
        }
    }

    /// Rotate a model-space point.
    #[must_use]
    pub fn apply(&self, point: [f32; 3]) -> [f32; 3] {
        let [x, y, z] = point;
        let (sp, cp) = self.pitch.sin_cos();
        let (sy, cy) = self.yaw.sin_cos();
        let (sr, cr) = self.roll.sin_cos();

        let y1 = y * cp - z * sp;
        let z1 = y * sp + z * cp;

        let x2 = x * cy + z1 * sy;
        let z2 = -x * sy + z1 * cy;

        let x3 = x2 * cr - y1 * sr;
        let y3 = x2 * sr + y1 * cr;
        [x3, y3, z2]
    }
}

/// Surface-space result of projecting one model point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub x: f32,
    pub y: f32,
    /// Perspective scale, clamped to `[0, max_scale]`; zero when not visible.
    pub scale: f32,
    /// Rotated depth plus camera distance; larger is farther.
    pub depth: f32,
    pub visible: bool,
}

impl Projection {
    /// Radius scaled by perspective, safe to hand to a drawing surface.
    #[must_use]
    pub fn scaled(&self, radius: f32) -> f32 {
        let scaled = radius * self.scale;
        if scaled.is_finite() { scaled.max(0.0) } else { 0.0 }
    }
}

/// Stateless perspective transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projector {
    fov: f32,
    distance: f32,
    max_scale: f32,
}

impl Default for Projector {
    fn default() -> Self {
        Self::new(&ProjectionSettings::default())
    }
}

impl Projector {
    #[must_use]
    pub fn new(settings: &ProjectionSettings) -> Self {
        Self {
            fov: settings.fov,
            distance: settings.distance,
            max_scale: settings.max_scale,
        }
    }

    #[inline]
    #[must_use]
    pub fn fov(&self) -> f32 {
        self.fov
    }

    #[inline]
    #[must_use]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Project `point` after `rotation` onto a surface of `size` (width,
    /// height), centred on the surface.
    #[must_use]
    pub fn project(&self, point: [f32; 3], rotation: &Rotation, size: (f32, f32)) -> Projection {
        let center_x = size.0 * 0.5;
        let center_y = size.1 * 0.5;
        let [x, y, z] = rotation.apply(point);
        let denominator = self.fov + z + self.distance;

        if !denominator.is_finite() || denominator <= NEAR_EPSILON {
            return Projection {
                x: center_x,
                y: center_y,
                scale: 0.0,
                depth: f32::MAX,
                visible: false,
            };
        }

        let raw = self.fov / denominator;
        let scale = if raw.is_finite() {
            raw.clamp(0.0, self.max_scale)
        } else {
            0.0
        };
        let sx = center_x + x * scale;
        let sy = center_y + y * scale;
        if !(sx.is_finite() && sy.is_finite()) {
            return Projection {
                x: center_x,
                y: center_y,
                scale: 0.0,
                depth: f32::MAX,
                visible: false,
            };
        }

        Projection {
            x: sx,
            y: sy,
            scale,
            depth: z + self.distance,
            visible: scale > 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const SURFACE: (f32, f32) = (800.0, 600.0);

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() <= eps
    }

    #[test]
    fn quarter_yaw_moves_x_into_depth() {
        let rotation = Rotation::new(0.0, FRAC_PI_2, 0.0);
        let [x, y, z] = rotation.apply([100.0, 0.0, 0.0]);
        assert!(approx_eq(x, 0.0, 1e-3), "x={x}");
        assert!(approx_eq(y, 0.0, 1e-3), "y={y}");
        assert!(approx_eq(z, -100.0, 1e-3), "z={z}");
    }

    #[test]
    fn nearer_points_scale_larger() {
        let projector = Projector::default();
        let rotation = Rotation::default();
        let near = projector.project([50.0, 0.0, -100.0], &rotation, SURFACE);
        let far = projector.project([50.0, 0.0, 100.0], &rotation, SURFACE);
        assert!(near.scale > far.scale);
        assert!(near.depth < far.depth);
        assert!(near.x > far.x, "perspective should spread nearer points");
    }

    #[test]
    fn point_behind_camera_is_hidden() {
        let projector = Projector::default();
        let hidden = projector.project([0.0, 0.0, -5_000.0], &Rotation::default(), SURFACE);
        assert!(!hidden.visible);
        assert_eq!(hidden.scale, 0.0);
        assert_eq!((hidden.x, hidden.y), (400.0, 300.0));
        assert_eq!(hidden.scaled(12.0), 0.0);
    }

    #[test]
    fn scale_is_clamped_near_the_plane() {
        let settings = ProjectionSettings {
            max_scale: 3.0,
            ..ProjectionSettings::default()
        };
        let projector = Projector::new(&settings);
        let z = -(settings.fov + settings.distance) + 0.01;
        let projection = projector.project([1.0, 1.0, z], &Rotation::default(), SURFACE);
        assert!(projection.visible);
        assert_eq!(projection.scale, 3.0);
    }

    #[test]
    fn rotation_at_accumulates_rates() {
        let settings = ProjectionSettings {
            tilt: [0.1, 0.2, 0.3],
            rotation_rates: [1.0, 2.0, 3.0],
            ..ProjectionSettings::default()
        };
        let rotation = Rotation::at(2.0, &settings);
        assert!(approx_eq(rotation.pitch, 2.1, 1e-6));
        assert!(approx_eq(rotation.yaw, 4.2, 1e-6));
        assert!(approx_eq(rotation.roll, 6.3, 1e-6));
    }

    #[test]
    fn rotation_turns_smoothly_at_late_times() {
        let settings = ProjectionSettings {
            rotation_rates: [0.0, 0.1234, 0.0],
            ..ProjectionSettings::default()
        };
        let projector = Projector::new(&settings);
        let point = [120.0, 0.0, 40.0];
        let mut time = 6_283.0;
        let mut previous = projector.project(point, &Rotation::at(time, &settings), SURFACE);
        for _ in 0..240 {
            time += 1.0 / 60.0;
            let next = projector.project(point, &Rotation::at(time, &settings), SURFACE);
            let jump = (next.x - previous.x).hypot(next.y - previous.y);
            assert!(jump < 2.0, "projection jumped {jump}px at t={time}");
            previous = next;
        }
    }
}
