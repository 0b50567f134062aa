// Geometry module - receiver positions and derived array constants

pub mod array;
pub mod receiver;

pub use array::{ArrayConstants, ReceiverArray};
pub use receiver::Receiver;

/// 3D position in metres
pub type Position = nalgebra::Vector3<f64>;

/// Number of receivers in a multilateration array
pub const RECEIVER_COUNT: usize = 4;
