//! Minimum SDK API surface.
//!
//! The program declares a minimum Android API level; references may
//! only be rebound to platform members that already exist at that
//! level. The surface is built once at startup from the platform
//! description and stays read-only during analysis.

use dexopt_ir::refs::{FieldRef, MethodRef};
use std::collections::BTreeSet;

/// The set of platform members available at the targeted API level.
#[derive(Debug, Default)]
pub struct MinSdkApi {
    methods: BTreeSet<MethodRef>,
    fields: BTreeSet<FieldRef>,
}

impl MinSdkApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_method(&mut self, mref: MethodRef) {
        self.methods.insert(mref);
    }

    pub fn insert_field(&mut self, fref: FieldRef) {
        self.fields.insert(fref);
    }

    #[must_use]
    pub fn has_method(&self, mref: &MethodRef) -> bool {
        self.methods.contains(mref)
    }

    #[must_use]
    pub fn has_field(&self, fref: &FieldRef) -> bool {
        self.fields.contains(fref)
    }
}
