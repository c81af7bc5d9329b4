//! In-memory WebAssembly module representation
//!
//! Modules are assembled directly through this API; there is no binary or
//! text decoder. Index spaces follow the core specification: imported
//! functions, globals and tags come first, followed by the module's own
//! definitions, so imports must be declared before definitions.

pub mod control;
pub mod instruction;

pub use control::ControlMap;
pub use instruction::{BlockType, Instruction};

use crate::error::Error;
use crate::runtime::Value;
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    ExternRef,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::ExternRef => "externref",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i32" => Ok(ValueType::I32),
            "i64" => Ok(ValueType::I64),
            "f32" => Ok(ValueType::F32),
            "f64" => Ok(ValueType::F64),
            "externref" => Ok(ValueType::ExternRef),
            other => Err(Error::Type(format!("invalid value type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionType {
    pub parameters: Vec<ValueType>,
    #[serde(rename = "results")]
    pub return_types: Vec<ValueType>,
}

impl FunctionType {
    pub fn new(parameters: Vec<ValueType>, return_types: Vec<ValueType>) -> Self {
        FunctionType {
            parameters,
            return_types,
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let join = |types: &[ValueType]| types.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        write!(f, "({}) -> ({})", join(&self.parameters), join(&self.return_types))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagType {
    pub parameters: Vec<ValueType>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportKind {
    /// Function import, by type index
    Function(u32),
    Global(GlobalType),
    Tag(TagType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub kind: ImportKind,
}

/// A function defined by the module
#[derive(Debug, Clone)]
pub struct Function {
    pub type_index: u32,
    /// Declared locals, after the parameters
    pub locals: Vec<ValueType>,
    pub body: Rc<Vec<Instruction>>,
    control: OnceCell<Rc<ControlMap>>,
}

impl Function {
    /// The validated control map, built on first use and shared by every
    /// instance of the module
    pub fn control(&self) -> Result<Rc<ControlMap>, Error> {
        self.control
            .get_or_try_init(|| ControlMap::build(&self.body).map(Rc::new))
            .cloned()
    }
}

#[derive(Debug, Clone)]
pub struct Global {
    pub global_type: GlobalType,
    pub init: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportIndex {
    Function(u32),
    Global(u32),
    Tag(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub index: ExportIndex,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub tags: Vec<TagType>,
    pub exports: Vec<Export>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Intern a function type, returning its type index
    pub fn add_type(&mut self, func_type: FunctionType) -> u32 {
        if let Some(idx) = self.types.iter().position(|t| *t == func_type) {
            return idx as u32;
        }
        self.types.push(func_type);
        (self.types.len() - 1) as u32
    }

    fn imported(&self, pred: impl Fn(&ImportKind) -> bool) -> u32 {
        self.imports.iter().filter(|i| pred(&i.kind)).count() as u32
    }

    pub fn imported_function_count(&self) -> u32 {
        self.imported(|k| matches!(k, ImportKind::Function(_)))
    }

    pub fn imported_global_count(&self) -> u32 {
        self.imported(|k| matches!(k, ImportKind::Global(_)))
    }

    pub fn imported_tag_count(&self) -> u32 {
        self.imported(|k| matches!(k, ImportKind::Tag(_)))
    }

    /// Declare a function import, returning its function index
    ///
    /// # Errors
    /// If functions have already been defined, since their indices would shift
    pub fn add_import_function(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        func_type: FunctionType,
    ) -> Result<u32, Error> {
        if !self.functions.is_empty() {
            return Err(Error::Compile("function imports must precede function definitions".to_string()));
        }
        let type_index = self.add_type(func_type);
        let index = self.imported_function_count();
        self.imports.push(Import {
            module: module.into(),
            name: name.into(),
            kind: ImportKind::Function(type_index),
        });
        Ok(index)
    }

    /// Declare a global import, returning its global index
    pub fn add_import_global(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        global_type: GlobalType,
    ) -> Result<u32, Error> {
        if !self.globals.is_empty() {
            return Err(Error::Compile("global imports must precede global definitions".to_string()));
        }
        let index = self.imported_global_count();
        self.imports.push(Import {
            module: module.into(),
            name: name.into(),
            kind: ImportKind::Global(global_type),
        });
        Ok(index)
    }

    /// Declare a tag import, returning its tag index
    pub fn add_import_tag(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        tag_type: TagType,
    ) -> Result<u32, Error> {
        if !self.tags.is_empty() {
            return Err(Error::Compile("tag imports must precede tag definitions".to_string()));
        }
        let index = self.imported_tag_count();
        self.imports.push(Import {
            module: module.into(),
            name: name.into(),
            kind: ImportKind::Tag(tag_type),
        });
        Ok(index)
    }

    /// Define a function, returning its function index
    pub fn add_function(&mut self, func_type: FunctionType, locals: Vec<ValueType>, body: Vec<Instruction>) -> u32 {
        let type_index = self.add_type(func_type);
        self.functions.push(Function {
            type_index,
            locals,
            body: Rc::new(body),
            control: OnceCell::new(),
        });
        self.imported_function_count() + self.functions.len() as u32 - 1
    }

    /// Define a global, returning its global index
    pub fn add_global(&mut self, global_type: GlobalType, init: Value) -> u32 {
        self.globals.push(Global { global_type, init });
        self.imported_global_count() + self.globals.len() as u32 - 1
    }

    /// Define a tag, returning its tag index
    pub fn add_tag(&mut self, tag_type: TagType) -> u32 {
        self.tags.push(tag_type);
        self.imported_tag_count() + self.tags.len() as u32 - 1
    }

    pub fn export(&mut self, name: impl Into<String>, index: ExportIndex) {
        self.exports.push(Export {
            name: name.into(),
            index,
        });
    }

    /// Type of the function at `func_idx` in the function index space
    pub fn function_type(&self, func_idx: u32) -> Result<&FunctionType, Error> {
        let imported = self.imported_function_count();
        let type_index = if func_idx < imported {
            self.imports
                .iter()
                .filter_map(|i| match i.kind {
                    ImportKind::Function(t) => Some(t),
                    _ => None,
                })
                .nth(func_idx as usize)
        } else {
            self.functions.get((func_idx - imported) as usize).map(|f| f.type_index)
        };
        type_index
            .and_then(|t| self.types.get(t as usize))
            .ok_or_else(|| Error::Compile(format!("function index out of bounds: {func_idx}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig_i_i() -> FunctionType {
        FunctionType::new(vec![ValueType::I32], vec![ValueType::I32])
    }

    #[test]
    fn test_index_spaces_put_imports_first() {
        let mut module = Module::new("test");
        let import = module.add_import_function("m", "import", sig_i_i()).unwrap();
        let func = module.add_function(sig_i_i(), vec![], vec![Instruction::LocalGet(0)]);
        assert_eq!(import, 0);
        assert_eq!(func, 1);
        assert_eq!(module.types.len(), 1, "identical types are interned");
        assert_eq!(module.function_type(1).unwrap(), &sig_i_i());
    }

    #[test]
    fn test_import_after_definition_is_rejected() {
        let mut module = Module::new("test");
        module.add_function(sig_i_i(), vec![], vec![]);
        assert!(module.add_import_function("m", "late", sig_i_i()).is_err());
    }

    #[test]
    fn test_tag_and_global_indices() {
        let mut module = Module::new("test");
        let imported = module
            .add_import_tag("m", "tag", TagType { parameters: vec![] })
            .unwrap();
        let own = module.add_tag(TagType {
            parameters: vec![ValueType::I32],
        });
        assert_eq!((imported, own), (0, 1));

        let g = module.add_global(
            GlobalType {
                value_type: ValueType::I32,
                mutable: true,
            },
            Value::I32(0),
        );
        assert_eq!(g, 0);
    }

    #[test]
    fn test_value_type_names() {
        assert_eq!("externref".parse::<ValueType>().unwrap(), ValueType::ExternRef);
        assert!("anyref".parse::<ValueType>().is_err());
        assert_eq!(sig_i_i().to_string(), "(i32) -> (i32)");
    }

    #[test]
    fn test_function_type_deserialises_from_signature_object() {
        let ty: FunctionType = serde_json::from_str(r#"{"parameters": ["externref", "i32"], "results": ["i32"]}"#).unwrap();
        assert_eq!(
            ty,
            FunctionType::new(vec![ValueType::ExternRef, ValueType::I32], vec![ValueType::I32])
        );
    }
}
