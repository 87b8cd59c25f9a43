//! Class, method and field definitions as handed over by the loader.
//!
//! These are plain data structures: the repository of the analysis
//! crate ingests them, assigns unique identifiers and wires up the
//! class hierarchy.

use crate::code::Code;
use crate::flags::{ClassFlags, FieldFlags, MethodFlags};
use crate::refs::Proto;
use crate::types::Type;

/// A class definition.
#[derive(Debug)]
pub struct ClassDef {
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub flags: ClassFlags,
    pub methods: Vec<MethodDef>,
    pub fields: Vec<FieldDef>,
}

impl ClassDef {
    /// A public class extending `java/lang/Object`, with no members.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            superclass: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            flags: ClassFlags::ACC_PUBLIC,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }
}

/// A method definition. `code` is `None` for abstract and native
/// methods.
#[derive(Debug)]
pub struct MethodDef {
    pub name: String,
    pub proto: Proto,
    pub flags: MethodFlags,
    pub code: Option<Code>,
}

/// A field definition.
#[derive(Debug)]
pub struct FieldDef {
    pub name: String,
    pub type_: Type,
    pub flags: FieldFlags,
}
