use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::FuncDef;
use crate::error::{Error, Result};
use crate::runtime::Value;

/// Activation records linked to their lexically enclosing record
///
/// Records live in an arena and are popped in call order. A record's parent
/// is always older than the record itself, so popping never strands a link.
#[derive(Debug, Clone)]
pub struct Environment {
    frames: Vec<Frame>,
}

/// Single activation record
#[derive(Debug, Clone, Default)]
struct Frame {
    /// Variables defined in this record
    variables: HashMap<String, Value>,
    /// Functions declared in this record
    functions: HashMap<String, Rc<FuncDef>>,
    /// Names declared `global` here
    globals: HashSet<String>,
    /// Index of the lexically enclosing record (None for the global record)
    parent: Option<usize>,
}

impl Environment {
    /// Index of the global record
    pub const GLOBAL: usize = 0;

    /// Creates a new environment with a global record
    pub fn new() -> Self {
        Environment {
            frames: vec![Frame::default()],
        }
    }

    /// Push a record nested in `parent`; returns its index
    pub fn push(&mut self, parent: usize) -> usize {
        self.frames.push(Frame {
            parent: Some(parent),
            ..Frame::default()
        });
        self.frames.len() - 1
    }

    /// Drop `frame` and every record pushed after it
    pub fn pop(&mut self, frame: usize) {
        if frame > Self::GLOBAL {
            self.frames.truncate(frame);
        }
    }

    /// Number of live records
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Define a variable in `frame`
    pub fn define(&mut self, frame: usize, name: &str, value: Value) -> Result<()> {
        self.frame_mut(frame)?
            .variables
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Declare a function in `frame`
    pub fn define_function(&mut self, frame: usize, func: Rc<FuncDef>) -> Result<()> {
        self.frame_mut(frame)?
            .functions
            .insert(func.name.clone(), func);
        Ok(())
    }

    /// Route `name` in `frame` to the global record
    pub fn declare_global(&mut self, frame: usize, name: &str) -> Result<()> {
        self.frame_mut(frame)?.globals.insert(name.to_string());
        Ok(())
    }

    /// Read a variable visible from `frame`
    pub fn get(&self, frame: usize, name: &str) -> Result<Value> {
        let owner = self.resolve(frame, name)?;
        self.frames[owner]
            .variables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UndefinedName {
                name: name.to_string(),
            })
    }

    /// Assign a variable visible from `frame`
    pub fn set(&mut self, frame: usize, name: &str, value: Value) -> Result<()> {
        let owner = self.resolve(frame, name)?;
        self.frames[owner]
            .variables
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Function visible from `frame`, with the record it was declared in
    pub fn function(&self, frame: usize, name: &str) -> Option<(usize, Rc<FuncDef>)> {
        let mut current = Some(frame);
        while let Some(index) = current {
            let record = self.frames.get(index)?;
            if let Some(func) = record.functions.get(name) {
                return Some((index, Rc::clone(func)));
            }
            current = record.parent;
        }
        None
    }

    /// Record that holds `name` as seen from `frame`
    fn resolve(&self, frame: usize, name: &str) -> Result<usize> {
        let mut current = Some(frame);
        while let Some(index) = current {
            let record = self.frames.get(index).ok_or_else(|| {
                Error::internal(format!("activation record {} does not exist", index))
            })?;
            if record.globals.contains(name) {
                return Ok(Self::GLOBAL);
            }
            if record.variables.contains_key(name) {
                return Ok(index);
            }
            current = record.parent;
        }
        Err(Error::UndefinedName {
            name: name.to_string(),
        })
    }

    fn frame_mut(&mut self, frame: usize) -> Result<&mut Frame> {
        self.frames
            .get_mut(frame)
            .ok_or_else(|| Error::internal(format!("activation record {} does not exist", frame)))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_lookup_and_shadowing() {
        let mut env = Environment::new();
        env.define(Environment::GLOBAL, "x", Value::Int(1)).unwrap();
        let f = env.push(Environment::GLOBAL);
        assert_eq!(env.get(f, "x").unwrap().as_int().unwrap(), 1);

        env.define(f, "x", Value::Int(2)).unwrap();
        assert_eq!(env.get(f, "x").unwrap().as_int().unwrap(), 2);
        assert_eq!(env.get(Environment::GLOBAL, "x").unwrap().as_int().unwrap(), 1);
    }

    #[test]
    fn test_global_declaration_skips_enclosing_function() {
        let mut env = Environment::new();
        env.define(Environment::GLOBAL, "x", Value::Int(1)).unwrap();
        let f = env.push(Environment::GLOBAL);
        env.define(f, "x", Value::Int(2)).unwrap();
        let g = env.push(f);
        env.declare_global(g, "x").unwrap();
        env.set(g, "x", Value::Int(3)).unwrap();

        assert_eq!(env.get(Environment::GLOBAL, "x").unwrap().as_int().unwrap(), 3);
        assert_eq!(env.get(f, "x").unwrap().as_int().unwrap(), 2);
    }

    #[test]
    fn test_pop_and_undefined() {
        let mut env = Environment::new();
        let f = env.push(Environment::GLOBAL);
        env.define(f, "y", Value::None).unwrap();
        env.pop(f);
        assert_eq!(env.depth(), 1);
        assert!(matches!(
            env.get(Environment::GLOBAL, "y"),
            Err(Error::UndefinedName { .. })
        ));
    }
}
