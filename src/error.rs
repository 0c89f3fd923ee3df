//! Mount errors.

use thiserror::Error;

/// Why a tree could not be mounted.
///
/// Returned before any component is constructed or rendered.
#[derive(Debug, Error)]
pub enum MountError {
	#[error("mount target is missing")]
	MissingTarget,

	#[error("no document is available")]
	MissingDocument,

	#[error("no element with id {id:?} found")]
	MissingElement { id: String },
}
