//! WebAssembly module instance

use super::FuncAddr;
use crate::error::Error;
use crate::host::{Global, Tag};
use crate::module::ExportIndex;
use std::collections::HashMap;

/// A WebAssembly module instance
///
/// Index spaces hold imports first, then the module's own definitions.
/// Globals and tags are shared handles, so an imported global or tag is the
/// same object as the exporter's.
#[derive(Debug)]
pub struct Instance {
    pub(crate) functions: Vec<FuncAddr>,
    pub(crate) globals: Vec<Global>,
    pub(crate) tags: Vec<Tag>,
    pub(crate) exports: HashMap<String, ExportIndex>,
}

impl Instance {
    pub fn function(&self, idx: u32) -> Result<FuncAddr, Error> {
        self.functions
            .get(idx as usize)
            .copied()
            .ok_or_else(|| Error::Runtime(format!("function index out of bounds: {idx}")))
    }

    pub fn global(&self, idx: u32) -> Result<&Global, Error> {
        self.globals
            .get(idx as usize)
            .ok_or_else(|| Error::Runtime(format!("global index out of bounds: {idx}")))
    }

    pub fn tag(&self, idx: u32) -> Result<&Tag, Error> {
        self.tags
            .get(idx as usize)
            .ok_or_else(|| Error::Runtime(format!("tag index out of bounds: {idx}")))
    }

    /// Look up an export by name
    pub fn export(&self, name: &str) -> Result<ExportIndex, Error> {
        self.exports
            .get(name)
            .copied()
            .ok_or_else(|| Error::Type(format!("unknown export '{name}'")))
    }

    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }
}
