// src/resource/conflict.rs

//! Serialization and scoping rules between access sets.

use std::fmt;

use crate::errors::{Result, SchedError};
use crate::resource::access::AccessSet;

/// Why an earlier task must finish before a later one may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conflict {
    /// Earlier writes, later reads.
    ReadAfterWrite,
    /// Earlier reads, later writes.
    WriteAfterRead,
    /// Both write.
    WriteAfterWrite,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::ReadAfterWrite => f.write_str("RAW"),
            Conflict::WriteAfterRead => f.write_str("WAR"),
            Conflict::WriteAfterWrite => f.write_str("WAW"),
        }
    }
}

/// The strongest conflict between an earlier and a later access set, if any.
///
/// Write-after-write wins over the other kinds; it is the one worth showing in
/// a graph dump.
pub fn conflict_between(earlier: &AccessSet, later: &AccessSet) -> Option<Conflict> {
    let mut found = None;

    for a in earlier.iter() {
        for b in later.iter() {
            if !a.resource.overlaps(&b.resource) {
                continue;
            }
            let kind = match (a.mode.is_write(), b.mode.is_write()) {
                (true, true) => return Some(Conflict::WriteAfterWrite),
                (true, false) => Conflict::ReadAfterWrite,
                (false, true) => Conflict::WriteAfterRead,
                (false, false) => continue,
            };
            found.get_or_insert(kind);
        }
    }

    found
}

/// True iff `a` and `b` must not run concurrently: they touch an overlapping
/// resource and at least one of the two accesses writes.
pub fn is_serial(a: &AccessSet, b: &AccessSet) -> bool {
    conflict_between(a, b).is_some()
}

/// True iff every access in `sub` is covered by some access in `sup`.
pub fn is_superset(sup: &AccessSet, sub: &AccessSet) -> bool {
    sub.iter().all(|needed| {
        sup.iter()
            .any(|held| held.resource.covers(&needed.resource) && held.mode.covers(needed.mode))
    })
}

/// Fail with [`SchedError::ScopingViolation`] unless `parent` covers `child`.
///
/// `trace` lists the labels of the enclosing task chain, innermost first.
pub fn assert_superset(
    parent_label: &str,
    parent: &AccessSet,
    child_label: &str,
    child: &AccessSet,
    trace: Vec<String>,
) -> Result<()> {
    if is_superset(parent, child) {
        return Ok(());
    }

    Err(SchedError::ScopingViolation {
        parent: parent_label.to_string(),
        child: child_label.to_string(),
        parent_access: parent.to_string(),
        child_access: child.to_string(),
        trace,
    })
}
