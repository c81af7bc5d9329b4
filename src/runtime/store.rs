//! WebAssembly Store - manages runtime instances and provides global function addressing
//!
//! The Store owns all module instances and a global address space for
//! functions, so that a function exported by one instance and imported by
//! another is the very same function instance. Wrappers resolve to addresses in
//! this space, which is what lets a continuation started in one instance
//! suspend inside a function of another.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │  ┌────────────────────────────────────────────────────────┐ │
//! │  │ Function Space (FuncAddr -> FunctionInstance)          │ │
//! │  │  [0]: Host { suspending import, Implicit }             │ │
//! │  │  [1]: Wasm { instance: 0, code: f }                    │ │
//! │  │  [2]: Wasm { instance: 1, code: main }                 │ │
//! │  └────────────────────────────────────────────────────────┘ │
//! │  ┌────────────────────────────────────────────────────────┐ │
//! │  │ Instance Registry                                      │ │
//! │  │  [0]: module_a              functions: [0, 1]          │ │
//! │  │  [1]: module_b (imports f)  functions: [1, 2]          │ │
//! │  └────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use super::frame::Code;
use super::imports::{resolve_function, resolve_global, resolve_tag, ImportObject};
use super::Instance;
use crate::bridge::suspending::HostImport;
use crate::error::Error;
use crate::host::{Global, Tag};
use crate::module::{ExportIndex, FunctionType, ImportKind, Module};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

/// Global function address - index into the Store's function space
///
/// FuncAddr provides stable, globally-unique identifiers for functions that work
/// across module boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncAddr(pub usize);

/// Index of an instance in the Store's registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub usize);

/// A function instance in the Store
#[derive(Debug, Clone)]
pub enum FunctionInstance {
    /// WebAssembly function defined by an instance
    Wasm { instance: InstanceId, code: Rc<Code> },
    /// Host callable bound to an import slot
    Host(Rc<HostImport>),
}

impl FunctionInstance {
    pub fn func_type(&self) -> &FunctionType {
        match self {
            FunctionInstance::Wasm { code, .. } => &code.func_type,
            FunctionInstance::Host(import) => &import.func_type,
        }
    }
}

#[derive(Debug, Default)]
pub struct Store {
    functions: Vec<FunctionInstance>,
    instances: Vec<Instance>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    pub fn allocate_function(&mut self, func: FunctionInstance) -> FuncAddr {
        self.functions.push(func);
        FuncAddr(self.functions.len() - 1)
    }

    pub fn function(&self, addr: FuncAddr) -> Result<&FunctionInstance, Error> {
        self.functions
            .get(addr.0)
            .ok_or_else(|| Error::Runtime(format!("unknown function address {}", addr.0)))
    }

    pub fn instance(&self, id: InstanceId) -> Result<&Instance, Error> {
        self.instances
            .get(id.0)
            .ok_or_else(|| Error::Runtime(format!("unknown instance {}", id.0)))
    }

    /// Create and register a new instance in the Store
    ///
    /// Resolves imports against `imports`, allocates the module's own
    /// functions, globals and tags, and builds the export map.
    ///
    /// # Errors
    /// - `TypeError` for a missing import or one whose type does not match
    /// - `CompileError` for a malformed function body, a mistyped global
    ///   initialiser, or an export referring past an index space
    pub fn create_instance(&mut self, module: &Module, imports: &ImportObject) -> Result<InstanceId, Error> {
        let id = InstanceId(self.instances.len());
        let mut functions = Vec::new();
        let mut globals = Vec::new();
        let mut tags = Vec::new();

        for (index, import) in module.imports.iter().enumerate() {
            let value = imports.get(&import.module, &import.name).ok_or_else(|| {
                Error::Type(format!(
                    "Import #{index} \"{}\" \"{}\": value is not provided",
                    import.module, import.name
                ))
            })?;
            match &import.kind {
                ImportKind::Function(type_index) => {
                    let expected = module
                        .types
                        .get(*type_index as usize)
                        .ok_or_else(|| Error::Compile(format!("type index out of bounds: {type_index}")))?;
                    functions.push(resolve_function(self, value, expected, import)?);
                }
                ImportKind::Global(global_type) => globals.push(resolve_global(value, global_type, import)?),
                ImportKind::Tag(tag_type) => tags.push(resolve_tag(value, tag_type, import)?),
            }
        }

        for function in &module.functions {
            let func_type = module
                .types
                .get(function.type_index as usize)
                .ok_or_else(|| Error::Compile(format!("type index out of bounds: {}", function.type_index)))?
                .clone();
            let code = Rc::new(Code {
                func_type,
                locals: function.locals.clone(),
                body: Rc::clone(&function.body),
                control: function.control()?,
            });
            functions.push(self.allocate_function(FunctionInstance::Wasm { instance: id, code }));
        }

        for global in &module.globals {
            if global.init.typ() != global.global_type.value_type {
                return Err(Error::Compile(format!(
                    "global initialiser has type {}, expected {}",
                    global.init.typ(),
                    global.global_type.value_type
                )));
            }
            globals.push(Global::new(global.global_type, global.init.clone()));
        }

        tags.extend(module.tags.iter().map(|t| Tag::new(t.parameters.clone())));

        let mut exports = HashMap::new();
        for export in &module.exports {
            let (len, idx) = match export.index {
                ExportIndex::Function(idx) => (functions.len(), idx),
                ExportIndex::Global(idx) => (globals.len(), idx),
                ExportIndex::Tag(idx) => (tags.len(), idx),
            };
            if idx as usize >= len {
                return Err(Error::Compile(format!("export '{}' is out of bounds", export.name)));
            }
            if exports.insert(export.name.clone(), export.index).is_some() {
                return Err(Error::Compile(format!("duplicate export '{}'", export.name)));
            }
        }

        trace!(
            module = %module.name,
            instance = id.0,
            functions = functions.len(),
            globals = globals.len(),
            tags = tags.len(),
            "instantiated module"
        );
        self.instances.push(Instance {
            functions,
            globals,
            tags,
            exports,
        });
        Ok(id)
    }
}
