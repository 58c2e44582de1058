//! Interactive tracer: the bundled tree-walking interpreter for the
//! target-language subset, plus the three operating modes (signature,
//! extract-args, interactive) built on top of it.

pub mod argfilter;
pub mod builtins;
pub mod debugger;
pub mod env;
pub mod errors;
pub mod flow;
pub mod frame;
pub mod interpreter;
pub mod module;
pub mod projection;
pub mod runtime_args;
pub mod signature_mode;
pub mod static_args;
pub mod value;

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::rc::Rc;

    use crate::value::SourceModule;

    /// A minimal in-memory module for tests that only need a `Rc<SourceModule>`
    /// to attach to a `FunctionValue`/`ClassValue`, not real source text.
    pub fn empty_module() -> Rc<SourceModule> {
        let source = String::new();
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into()).expect("load python grammar");
        let tree = parser.parse(&source, None).expect("parse empty source");
        Rc::new(SourceModule {
            dotted_name: "test_module".to_string(),
            path: PathBuf::from("test_module.py"),
            source,
            tree,
        })
    }
}
