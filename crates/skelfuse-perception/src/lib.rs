//! `skelfuse-perception` – multi-camera skeleton fusion.
//!
//! Turns landmark streams from independently posed cameras into one skeleton
//! in a shared reference frame.
//!
//! # Modules
//!
//! - [`basis`] – [`BasisTranslator`][basis::BasisTranslator]: fits the rigid
//!   transform between a camera's basis and the base basis from matched
//!   calibration points (Kabsch–Umeyama), then maps points across.
//! - [`restorer`] – [`SkeletalRestorer`][restorer::SkeletalRestorer]: one
//!   translator per feed; fuses every feed's landmarks per frame into a
//!   confidence-weighted skeleton.
//! - [`shared`] – [`SharedRestorer`][shared::SharedRestorer]: read-write
//!   locked handle so fusion can run from several threads while registration
//!   stays exclusive.
//! - [`matrix`] – conversions between wire records and `nalgebra` matrices.

pub mod basis;
pub mod matrix;
pub mod restorer;
pub mod shared;

pub use basis::{BasisTranslator, RigidTransform};
pub use restorer::{FusedSkeleton, SkeletalRestorer};
pub use shared::SharedRestorer;
