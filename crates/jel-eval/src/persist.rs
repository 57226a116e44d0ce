//! Saving and restoring an environment as JSON lines.
//!
//! Each line is one [`Record`]. Types and functions are stored as source
//! text and re-parsed on load, so a stream stays readable across grammar
//! and registry changes as long as the names still resolve. Host objects
//! other than the built-in list, map and string builder are not persisted.
//! An array or collection shared by several variables is written once and
//! comes back as one shared value.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use jel_model::lang::{self, BuilderData, ListData, MapData};
use jel_model::{ArrayData, Class, ClassRegistry, Primitive, Value};
use jel_parser::{ParseError, Parser};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::env::{EnvError, Environment, StaticImport, Variable};
use crate::error::EvalError;
use crate::evaluator::Evaluator;

/// One line of a persisted environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Variable {
        name: String,
        /// Fully qualified type, parsed back with the type grammar.
        ty: String,
        is_final: bool,
        /// `None` for a variable that was never assigned.
        value: Option<Encoded>,
    },
    Function {
        name: String,
        source: String,
    },
    Package {
        name: String,
    },
    TypeImport {
        name: String,
    },
    StaticImport {
        class: String,
        member: Option<String>,
    },
    History {
        value: Encoded,
    },
}

/// A persisted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Encoded {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(FloatRepr),
    Double(FloatRepr),
    String(String),
    Array { element: String, items: Vec<Encoded> },
    List(Vec<Encoded>),
    Map(Vec<(Encoded, Encoded)>),
    Builder(String),
    Class(String),
    /// An array or collection already written earlier in the stream.
    Ref(u32),
}

/// JSON has no NaN or infinities; those are spelled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FloatRepr {
    Finite(f64),
    Special(String),
}

impl FloatRepr {
    fn new(d: f64) -> Self {
        if d.is_nan() {
            Self::Special("NaN".into())
        } else if d.is_infinite() {
            Self::Special(if d > 0.0 { "Infinity" } else { "-Infinity" }.into())
        } else {
            Self::Finite(d)
        }
    }

    fn get(&self) -> f64 {
        match self {
            Self::Finite(d) => *d,
            Self::Special(s) => match s.as_str() {
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                _ => f64::NAN,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Eval(#[from] EvalError),
    #[error("unknown class {0}")]
    UnknownClass(String),
    #[error("reference to unknown value #{0}")]
    UnknownRef(u32),
    #[error("{0}")]
    Env(#[from] EnvError),
}

// ══════════════════════════════════════════════════════════════════════════════
// Values
// ══════════════════════════════════════════════════════════════════════════════

/// Key identifying an array or object handle.
fn handle_key(value: &Value) -> Option<usize> {
    match value {
        Value::Array(a) => Some(Rc::as_ptr(a) as *const () as usize),
        Value::Object(o) => Some(Rc::as_ptr(o) as *const () as usize),
        _ => None,
    }
}

/// Encodes the values of one stream. An array or collection reachable
/// from several places is written in full once; later occurrences become
/// [`Encoded::Ref`] to its position among the handles written so far.
#[derive(Debug, Default)]
pub struct Encoder {
    ids: HashMap<usize, u32>,
    written: Vec<usize>,
    /// Handles whose contents are being written.
    open: Vec<usize>,
}

impl Encoder {
    /// `None` for values that cannot be persisted, including collections
    /// that contain themselves. A failed value registers no handles.
    pub fn encode(&mut self, registry: &ClassRegistry, value: &Value) -> Option<Encoded> {
        let mark = self.written.len();
        let encoded = self.value(registry, value);
        if encoded.is_none() {
            for key in self.written.drain(mark..) {
                self.ids.remove(&key);
            }
        }
        encoded
    }

    fn value(&mut self, registry: &ClassRegistry, value: &Value) -> Option<Encoded> {
        let Some(key) = handle_key(value) else {
            return scalar(registry, value);
        };
        if let Some(&id) = self.ids.get(&key) {
            return Some(Encoded::Ref(id));
        }
        if self.open.contains(&key) {
            return None;
        }
        self.open.push(key);
        let encoded = self.handle(registry, value);
        self.open.pop();
        let encoded = encoded?;
        self.ids.insert(key, self.written.len() as u32);
        self.written.push(key);
        Some(encoded)
    }

    fn handle(&mut self, registry: &ClassRegistry, value: &Value) -> Option<Encoded> {
        match value {
            Value::Array(a) => {
                let items = a.items.borrow().clone();
                Some(Encoded::Array {
                    element: a.element.name(registry),
                    items: self.all(registry, &items)?,
                })
            }
            Value::Object(o) => {
                if let Some(items) = o.with(|l: &ListData| l.0.clone()) {
                    return self.all(registry, &items).map(Encoded::List);
                }
                if let Some(entries) = o.with(|m: &MapData| m.0.clone()) {
                    let mut out = Vec::with_capacity(entries.len());
                    for (k, v) in &entries {
                        out.push((self.value(registry, k)?, self.value(registry, v)?));
                    }
                    return Some(Encoded::Map(out));
                }
                o.with(|b: &BuilderData| String::from_utf16_lossy(&b.0))
                    .map(Encoded::Builder)
            }
            _ => None,
        }
    }

    fn all(&mut self, registry: &ClassRegistry, values: &[Value]) -> Option<Vec<Encoded>> {
        values.iter().map(|v| self.value(registry, v)).collect()
    }
}

fn scalar(registry: &ClassRegistry, value: &Value) -> Option<Encoded> {
    Some(match value {
        Value::Null => Encoded::Null,
        Value::Boolean(b) => Encoded::Boolean(*b),
        Value::Byte(v) => Encoded::Byte(*v),
        Value::Short(v) => Encoded::Short(*v),
        Value::Char(v) => Encoded::Char(*v),
        Value::Int(v) => Encoded::Int(*v),
        Value::Long(v) => Encoded::Long(*v),
        Value::Float(v) => Encoded::Float(FloatRepr::new(f64::from(*v))),
        Value::Double(v) => Encoded::Double(FloatRepr::new(*v)),
        Value::Str(s) => Encoded::String(s.to_string()),
        Value::Class(c) => Encoded::Class(c.name(registry)),
        Value::Array(_) | Value::Object(_) => return None,
    })
}

/// A class by its qualified name, including primitives and arrays.
pub fn class_from_name(registry: &ClassRegistry, name: &str) -> Option<Class> {
    if let Some(inner) = name.strip_suffix("[]") {
        return class_from_name(registry, inner).map(Class::array_of);
    }
    if let Some(p) = Primitive::from_name(name) {
        return Some(Class::Primitive(p));
    }
    registry.lookup(name).map(Class::Object)
}

/// Rebuilds the values of one stream, resolving [`Encoded::Ref`] against
/// the handles decoded so far, in the order [`Encoder`] numbered them.
#[derive(Debug, Default)]
pub struct Decoder {
    handles: Vec<Value>,
}

impl Decoder {
    pub fn decode(
        &mut self,
        registry: &ClassRegistry,
        encoded: &Encoded,
    ) -> Result<Value, PersistError> {
        let class = |name: &str| {
            class_from_name(registry, name)
                .ok_or_else(|| PersistError::UnknownClass(name.to_string()))
        };
        let value = match encoded {
            Encoded::Null => Value::Null,
            Encoded::Boolean(b) => Value::Boolean(*b),
            Encoded::Byte(v) => Value::Byte(*v),
            Encoded::Short(v) => Value::Short(*v),
            Encoded::Char(v) => Value::Char(*v),
            Encoded::Int(v) => Value::Int(*v),
            Encoded::Long(v) => Value::Long(*v),
            Encoded::Float(f) => Value::Float(f.get() as f32),
            Encoded::Double(f) => Value::Double(f.get()),
            Encoded::String(s) => Value::str(s),
            Encoded::Class(name) => Value::Class(class(name)?),
            Encoded::Ref(id) => {
                return self
                    .handles
                    .get(*id as usize)
                    .cloned()
                    .ok_or(PersistError::UnknownRef(*id));
            }
            Encoded::Array { element, items } => {
                let element = class(element)?;
                Value::Array(ArrayData::new(element, self.all(registry, items)?))
            }
            Encoded::List(items) => lang::new_list(self.all(registry, items)?),
            Encoded::Map(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    out.push((self.decode(registry, k)?, self.decode(registry, v)?));
                }
                lang::new_map(out)
            }
            Encoded::Builder(text) => lang::new_builder(text),
        };
        if handle_key(&value).is_some() {
            self.handles.push(value.clone());
        }
        Ok(value)
    }

    fn all(
        &mut self,
        registry: &ClassRegistry,
        items: &[Encoded],
    ) -> Result<Vec<Value>, PersistError> {
        items.iter().map(|e| self.decode(registry, e)).collect()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Environment
// ══════════════════════════════════════════════════════════════════════════════

impl Environment {
    fn records(&self) -> (Vec<Record>, Vec<String>) {
        let registry = self.registry().clone();
        let mut encoder = Encoder::default();
        let mut records = Vec::new();
        let mut failed = Vec::new();

        for name in self.package_imports() {
            records.push(Record::Package { name });
        }
        for id in self.type_imports().into_values() {
            records.push(Record::TypeImport {
                name: registry.name(id).to_string(),
            });
        }
        for import in self.static_imports() {
            records.push(Record::StaticImport {
                class: registry.name(import.class).to_string(),
                member: import.member,
            });
        }
        for var in self.variables() {
            let value = match &var.value {
                Some(v) if var.initialized => match encoder.encode(&registry, v) {
                    Some(e) => Some(e),
                    None => {
                        warn!(name = %var.name, "variable value cannot be persisted");
                        failed.push(var.name.clone());
                        continue;
                    }
                },
                _ => None,
            };
            records.push(Record::Variable {
                ty: var.ty.qualified_name(&registry),
                is_final: var.is_final,
                name: var.name,
                value,
            });
        }
        for (name, function) in self.functions() {
            records.push(Record::Function {
                name,
                source: function.source().to_string(),
            });
        }
        for value in self.all_history() {
            match encoder.encode(&registry, &value) {
                Some(value) => records.push(Record::History { value }),
                None => warn!("history entry cannot be persisted"),
            }
        }
        (records, failed)
    }

    /// Write every visible variable, function, import and history entry.
    /// Returns the names of variables whose values could not be written.
    pub fn save(&self, mut writer: impl Write) -> io::Result<Vec<String>> {
        let (records, failed) = self.records();
        for record in &records {
            serde_json::to_writer(&mut writer, record)?;
            writeln!(writer)?;
        }
        writer.flush()?;
        debug!(records = records.len(), failed = failed.len(), "environment saved");
        Ok(failed)
    }

    /// Replay a saved stream into this environment. Returns the number of
    /// records applied.
    pub fn load(
        &self,
        reader: impl BufRead,
        parser: &Parser,
        evaluator: &Evaluator,
    ) -> Result<usize, PersistError> {
        let registry = self.registry().clone();
        let lookup = |name: &str| {
            registry
                .lookup(name)
                .ok_or_else(|| PersistError::UnknownClass(name.to_string()))
        };
        let mut decoder = Decoder::default();
        let mut applied = 0;
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line)
                .map_err(|source| PersistError::Json { line: i + 1, source })?;
            match record {
                Record::Package { name } => self.add_package_import(name),
                Record::TypeImport { name } => {
                    let id = lookup(&name)?;
                    self.add_type_import(registry.get(id).simple_name(), id);
                }
                Record::StaticImport { class, member } => {
                    let class = lookup(&class)?;
                    self.add_static_import(StaticImport { class, member });
                }
                Record::Variable {
                    name,
                    ty,
                    is_final,
                    value,
                } => {
                    let (ast, node) = parser.parse_type(&ty)?;
                    let ty = evaluator.resolve_type(&ast, node, self)?;
                    let mut var = Variable::new(name, ty);
                    if let Some(value) = value {
                        var = var.with_value(Some(decoder.decode(&registry, &value)?));
                    }
                    if is_final {
                        var = var.final_var();
                    }
                    self.declare(var)?;
                }
                Record::Function { source, .. } => {
                    let parsed = parser.parse(&source)?;
                    let ast = Rc::new(parsed.ast);
                    for statement in parsed.statements {
                        evaluator.evaluate(&ast, statement, self, None, true)?;
                    }
                }
                Record::History { value } => {
                    self.add_history(decoder.decode(&registry, &value)?)
                }
            }
            applied += 1;
        }
        debug!(records = applied, "environment loaded");
        Ok(applied)
    }
}
