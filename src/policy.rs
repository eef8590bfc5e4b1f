//! Role to capability table.
//!
//! Handlers ask for a capability, never for a role, so adding a role only
//! means adding a row here.

use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Create courses and manage the ones you own.
    ManageCourses,
    /// Manage any course regardless of owner.
    ManageAnyCourse,
    Enroll,
    TrackProgress,
    /// Read the progress of linked children.
    ViewChildProgress,
    ViewAnyProgress,
    ViewActivity,
}

use Capability::*;

const POLICY: &[(Role, &[Capability])] = &[
    (Role::Student, &[Enroll, TrackProgress]),
    (Role::Parent, &[ViewChildProgress]),
    (Role::Instructor, &[ManageCourses]),
    (
        Role::Admin,
        &[
            ManageCourses,
            ManageAnyCourse,
            Enroll,
            TrackProgress,
            ViewChildProgress,
            ViewAnyProgress,
            ViewActivity,
        ],
    ),
    (Role::SubAdmin, &[ViewAnyProgress, ViewActivity]),
];

pub fn capabilities(role: Role) -> &'static [Capability] {
    POLICY
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, caps)| *caps)
        .unwrap_or(&[])
}
