//! Rigid bodies and the coordinate layouts a numerically differentiated
//! link reads and writes.
//!
//! Quaternions are laid out scalar first, `[e0, e1, e2, e3]`, in every
//! coordinate vector.

use anyhow::{bail, Result};
use nalgebra::{DVector, Matrix3, Quaternion, UnitQuaternion, Vector3};

/// Number of coordinates in the default two-body layout: `(3 + 4) * 2`.
pub const DEFAULT_NUM_COORDS: usize = 14;

const BODY_COORDS: usize = 7;

/// State access the link needs from a rigid body owned by the surrounding
/// dynamics engine.
pub trait RigidBody {
    fn pos(&self) -> Vector3<f64>;
    fn set_pos(&mut self, pos: Vector3<f64>);

    fn rot(&self) -> Quaternion<f64>;
    fn set_rot(&mut self, rot: Quaternion<f64>);

    fn pos_dt(&self) -> Vector3<f64>;
    fn set_pos_dt(&mut self, pos_dt: Vector3<f64>);

    /// Time derivative of the orientation quaternion.
    fn rot_dt(&self) -> Quaternion<f64>;
    fn set_rot_dt(&mut self, rot_dt: Quaternion<f64>);

    /// Refreshes derived geometry after a state write.
    fn update(&mut self, t: f64) -> Result<()>;
}

/// A free rigid body with position, orientation and their time derivatives.
///
/// The rotation matrix is cached and only refreshed by [`RigidBody::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pos: Vector3<f64>,
    rot: Quaternion<f64>,
    pos_dt: Vector3<f64>,
    rot_dt: Quaternion<f64>,
    rotation: Matrix3<f64>,
    time: f64,
}

impl Default for Body {
    fn default() -> Self {
        Self::new(Vector3::zeros(), Quaternion::identity())
    }
}

impl Body {
    pub fn new(pos: Vector3<f64>, rot: Quaternion<f64>) -> Self {
        Self {
            pos,
            rot,
            pos_dt: Vector3::zeros(),
            rot_dt: Quaternion::new(0.0, 0.0, 0.0, 0.0),
            rotation: rotation_matrix(&rot),
            time: 0.0,
        }
    }

    /// Time of the last [`RigidBody::update`].
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    /// Maps a point from body coordinates to world coordinates.
    pub fn point_to_world(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.pos + self.rotation * local
    }

    /// Angular velocity in world coordinates, `w = 2 * rot_dt * conj(rot)`.
    pub fn angular_velocity(&self) -> Vector3<f64> {
        (self.rot_dt * self.rot.conjugate()).imag() * 2.0
    }

    /// Sets `rot_dt` from a world-frame angular velocity.
    pub fn set_angular_velocity(&mut self, w: &Vector3<f64>) {
        let w_quat = Quaternion::from_imag(*w);
        self.rot_dt = w_quat * self.rot * 0.5;
    }
}

impl RigidBody for Body {
    fn pos(&self) -> Vector3<f64> {
        self.pos
    }

    fn set_pos(&mut self, pos: Vector3<f64>) {
        self.pos = pos;
    }

    fn rot(&self) -> Quaternion<f64> {
        self.rot
    }

    fn set_rot(&mut self, rot: Quaternion<f64>) {
        self.rot = rot;
    }

    fn pos_dt(&self) -> Vector3<f64> {
        self.pos_dt
    }

    fn set_pos_dt(&mut self, pos_dt: Vector3<f64>) {
        self.pos_dt = pos_dt;
    }

    fn rot_dt(&self) -> Quaternion<f64> {
        self.rot_dt
    }

    fn set_rot_dt(&mut self, rot_dt: Quaternion<f64>) {
        self.rot_dt = rot_dt;
    }

    fn update(&mut self, t: f64) -> Result<()> {
        if !self.pos.iter().all(|v| v.is_finite()) {
            bail!("Body position is not finite: {:?}", self.pos);
        }
        if !self.rot.coords.iter().all(|v| v.is_finite()) {
            bail!("Body orientation is not finite: {:?}", self.rot);
        }
        self.rotation = rotation_matrix(&self.rot);
        self.time = t;
        Ok(())
    }
}

/// Rotation matrix of a quaternion, taken as is (perturbed, non-unit
/// quaternions are not renormalized).
fn rotation_matrix(rot: &Quaternion<f64>) -> Matrix3<f64> {
    UnitQuaternion::new_unchecked(*rot)
        .to_rotation_matrix()
        .into_inner()
}

/// Coordinate layout of the bodies a link connects.
///
/// [`BodyPair`] provides the default 14-coordinate layout; links over three
/// bodies, or over positions and speeds, implement this trait directly.
pub trait LinkCoordinates {
    fn num_coords(&self) -> usize;

    /// Number of leading coordinates that belong to the first body; the
    /// Jacobian is split into `Cq1` and `Cq2` at this column.
    fn split(&self) -> usize {
        self.num_coords() / 2
    }

    /// Writes `q` into the bodies and refreshes them at time `t`.
    fn impose_coords(&mut self, q: &DVector<f64>, t: f64) -> Result<()>;

    /// Current positions, in the layout of [`impose_coords`](Self::impose_coords).
    fn fetch_coords(&self) -> DVector<f64>;

    /// Current velocities, in the same layout.
    fn fetch_coords_dt(&self) -> DVector<f64>;
}

/// Two rigid bodies, laid out as `[pos1, rot1, pos2, rot2]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyPair<B> {
    pub body1: B,
    pub body2: B,
}

impl<B: RigidBody> BodyPair<B> {
    pub fn new(body1: B, body2: B) -> Self {
        Self { body1, body2 }
    }
}

impl<B: RigidBody> LinkCoordinates for BodyPair<B> {
    fn num_coords(&self) -> usize {
        DEFAULT_NUM_COORDS
    }

    fn impose_coords(&mut self, q: &DVector<f64>, t: f64) -> Result<()> {
        if q.len() != DEFAULT_NUM_COORDS {
            bail!(
                "Body pair expects {} coordinates, got {}",
                DEFAULT_NUM_COORDS,
                q.len()
            );
        }
        let q = q.as_slice();
        let (first, second) = q.split_at(BODY_COORDS);
        self.body1.set_pos(read_vector(first));
        self.body1.set_rot(read_quaternion(&first[3..]));
        self.body2.set_pos(read_vector(second));
        self.body2.set_rot(read_quaternion(&second[3..]));
        self.body1.update(t)?;
        self.body2.update(t)?;
        Ok(())
    }

    fn fetch_coords(&self) -> DVector<f64> {
        let mut q = DVector::zeros(DEFAULT_NUM_COORDS);
        write_body(
            &mut q.as_mut_slice()[..BODY_COORDS],
            &self.body1.pos(),
            &self.body1.rot(),
        );
        write_body(
            &mut q.as_mut_slice()[BODY_COORDS..],
            &self.body2.pos(),
            &self.body2.rot(),
        );
        q
    }

    fn fetch_coords_dt(&self) -> DVector<f64> {
        let mut q = DVector::zeros(DEFAULT_NUM_COORDS);
        write_body(
            &mut q.as_mut_slice()[..BODY_COORDS],
            &self.body1.pos_dt(),
            &self.body1.rot_dt(),
        );
        write_body(
            &mut q.as_mut_slice()[BODY_COORDS..],
            &self.body2.pos_dt(),
            &self.body2.rot_dt(),
        );
        q
    }
}

fn read_vector(q: &[f64]) -> Vector3<f64> {
    Vector3::new(q[0], q[1], q[2])
}

fn read_quaternion(q: &[f64]) -> Quaternion<f64> {
    Quaternion::new(q[0], q[1], q[2], q[3])
}

fn write_body(out: &mut [f64], v: &Vector3<f64>, r: &Quaternion<f64>) {
    out[..3].copy_from_slice(v.as_slice());
    out[3] = r.w;
    out[4] = r.i;
    out[5] = r.j;
    out[6] = r.k;
}
