//! Bindings and storage.
//!
//! An [`Environment`] maps names to storage [`Location`]s through an immutable,
//! structurally shared list; the values themselves live in a [`Storage`] that
//! every environment derived from the same root shares. Extending prepends
//! and allocates, assignment writes through an existing location.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Write;
use std::rc::Rc;

use tracing::trace;

use crate::Error;
use crate::builtinops::get_builtin_ops;
use crate::value::Value;

/// Index of a storage cell; allocated from 1 upwards and never reused
pub type Location = u64;

/// Contents of one storage cell
#[derive(Debug, Clone)]
enum Slot {
    Value(Value),
    /// Boxed array contents, replaced wholesale on every update
    Array(Rc<[Value]>),
}

/// Shared mutable store backing a family of environments
#[derive(Debug, Clone, Default)]
pub struct Storage(Rc<RefCell<BTreeMap<Location, Slot>>>);

impl Storage {
    pub fn new() -> Self {
        Storage::default()
    }

    /// One past the highest location in use
    pub fn next_location(&self) -> Location {
        self.0
            .borrow()
            .last_key_value()
            .map_or(1, |(location, _)| location + 1)
    }

    fn insert(&self, slot: Slot) -> Location {
        let location = self.next_location();
        self.0.borrow_mut().insert(location, slot);
        location
    }

    pub fn allocate(&self, value: Value) -> Location {
        self.insert(Slot::Value(value))
    }

    pub fn allocate_array(&self, contents: Vec<Value>) -> Location {
        self.insert(Slot::Array(contents.into()))
    }

    /// The plain value at `location`, if any
    pub fn get(&self, location: Location) -> Option<Value> {
        match self.0.borrow().get(&location) {
            Some(Slot::Value(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn set(&self, location: Location, value: Value) {
        self.0.borrow_mut().insert(location, Slot::Value(value));
    }

    /// The array contents boxed at `location`, if any
    pub fn array(&self, location: Location) -> Option<Rc<[Value]>> {
        match self.0.borrow().get(&location) {
            Some(Slot::Array(contents)) => Some(Rc::clone(contents)),
            _ => None,
        }
    }

    pub fn replace_array(&self, location: Location, contents: Vec<Value>) {
        self.0
            .borrow_mut()
            .insert(location, Slot::Array(contents.into()));
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// True when both handles refer to the same store
    pub fn ptr_eq(&self, other: &Storage) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Where `print` writes
#[derive(Clone)]
pub struct Output(Rc<RefCell<Box<dyn Write>>>);

impl Output {
    pub fn stdout() -> Self {
        Output::new(std::io::stdout())
    }

    pub fn new(writer: impl Write + 'static) -> Self {
        Output(Rc::new(RefCell::new(Box::new(writer))))
    }

    pub fn write_str(&self, text: &str) -> Result<(), Error> {
        let mut writer = self.0.borrow_mut();
        writer
            .write_all(text.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| Error::Output(e.to_string()))
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Output")
    }
}

/// In-memory [`Output`] target whose contents can be read back
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput(Rc<RefCell<Vec<u8>>>);

impl CapturedOutput {
    pub fn new() -> Self {
        CapturedOutput::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct Binding {
    name: String,
    location: Location,
    next: Option<Rc<Binding>>,
}

#[derive(Debug, Clone)]
pub struct Environment {
    bindings: Option<Rc<Binding>>,
    storage: Storage,
    output: Output,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::with_output(Output::stdout())
    }
}

impl Environment {
    /// An environment with no bindings and a fresh storage
    pub fn new() -> Self {
        Environment::default()
    }

    fn with_output(output: Output) -> Self {
        Environment {
            bindings: None,
            storage: Storage::new(),
            output,
        }
    }

    /// The top-level environment: constants and every primitive
    pub fn root() -> Self {
        Environment::new().seeded()
    }

    /// [`Environment::root`] with `print` redirected to `writer`
    pub fn root_with_output(writer: impl Write + 'static) -> Self {
        Environment::with_output(Output::new(writer)).seeded()
    }

    fn seeded(self) -> Self {
        let constants = [
            ("true", Value::Boolean(true)),
            ("false", Value::Boolean(false)),
            ("void", Value::Void),
            ("null", Value::Null),
            ("π", Value::Real(std::f64::consts::PI)),
            ("pi", Value::Real(std::f64::consts::PI)),
        ];
        let primitives = get_builtin_ops()
            .iter()
            .map(|op| (op.id.to_owned(), Value::Primitive(op.id)));
        self.extend(
            constants
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value))
                .chain(primitives),
        )
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    /// A new environment with `values` bound in front of the current bindings.
    ///
    /// Each value gets a fresh location in the shared storage; later entries
    /// shadow earlier ones of the same name.
    pub fn extend(&self, values: impl IntoIterator<Item = (String, Value)>) -> Environment {
        let mut bindings = self.bindings.clone();
        for (name, value) in values {
            let location = self.storage.allocate(value);
            trace!(%name, location, "bind");
            bindings = Some(Rc::new(Binding {
                name,
                location,
                next: bindings,
            }));
        }
        Environment {
            bindings,
            storage: self.storage.clone(),
            output: self.output.clone(),
        }
    }

    fn bindings(&self) -> impl Iterator<Item = &Binding> {
        std::iter::successors(self.bindings.as_deref(), |binding| binding.next.as_deref())
    }

    /// Location of the innermost binding of `name`
    pub fn location(&self, name: &str) -> Option<Location> {
        self.bindings()
            .find(|binding| binding.name == name)
            .map(|binding| binding.location)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.location(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.location(name)
            .and_then(|location| self.storage.get(location))
            .ok_or_else(|| Error::UndefinedSymbol(name.to_owned()))
    }

    /// Overwrite the value of an existing binding in place
    pub fn update(&self, name: &str, value: Value) -> Result<(), Error> {
        let location = self
            .location(name)
            .ok_or_else(|| Error::UndefinedSymbol(name.to_owned()))?;
        self.storage.set(location, value);
        Ok(())
    }

    /// Visible `(name, value)` pairs, innermost first, shadowed ones included
    pub fn value_bindings(&self) -> Vec<(String, Value)> {
        self.bindings()
            .filter_map(|binding| {
                self.storage
                    .get(binding.location)
                    .map(|value| (binding.name.clone(), value))
            })
            .collect()
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Environment: ")?;
        for (i, binding) in self.bindings().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "<Binding: {}: {}>", binding.name, binding.location)?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn bind(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn test_storage_locations() {
        let storage = Storage::new();
        assert!(storage.is_empty());
        assert_eq!(storage.next_location(), 1);
        assert_eq!(storage.allocate(Value::Integer(1)), 1);
        assert_eq!(storage.allocate_array(vec![Value::Null; 3]), 2);
        assert_eq!(storage.next_location(), 3);

        assert_eq!(storage.get(1), Some(Value::Integer(1)));
        assert_eq!(storage.get(2), None);
        assert_eq!(storage.array(2).unwrap().len(), 3);
        assert!(storage.array(1).is_none());

        storage.set(10, Value::Void);
        assert_eq!(storage.next_location(), 11);
        assert_eq!(storage.len(), 3);
    }

    #[test]
    fn test_extend_and_shadow() {
        let env = Environment::new().extend(bind(&[("a", Value::Integer(1)), ("b", Value::Integer(2))]));
        let inner = env.extend(bind(&[("a", Value::from("shadow"))]));

        assert_eq!(env.lookup("a"), Ok(Value::Integer(1)));
        assert_eq!(inner.lookup("a"), Ok(Value::from("shadow")));
        assert_eq!(inner.lookup("b"), Ok(Value::Integer(2)));
        assert_eq!(env.lookup("c"), Err(Error::UndefinedSymbol("c".into())));
        assert!(inner.contains("b"));
        assert!(!env.contains("c"));
        assert!(inner.storage().ptr_eq(env.storage()));

        assert_eq!(env.to_string(), "<Environment: <Binding: b: 2>, <Binding: a: 1>>");
        assert_eq!(
            inner
                .value_bindings()
                .into_iter()
                .map(|(name, _)| name)
                .collect::<Vec<_>>(),
            vec!["a", "b", "a"]
        );
    }

    #[test]
    fn test_update_writes_through_shared_storage() {
        let outer = Environment::new().extend(bind(&[("x", Value::Integer(1))]));
        let inner = outer.extend(bind(&[("y", Value::Integer(2))]));

        inner.update("x", Value::Integer(5)).unwrap();
        assert_eq!(outer.lookup("x"), Ok(Value::Integer(5)));

        // Bindings added to the inner environment stay invisible outside it
        assert_eq!(outer.lookup("y"), Err(Error::UndefinedSymbol("y".into())));
        assert_eq!(
            outer.update("y", Value::Void),
            Err(Error::UndefinedSymbol("y".into()))
        );
    }

    #[test]
    fn test_roots_are_independent() {
        let root1 = Environment::root();
        let root2 = Environment::root();
        assert!(!root1.storage().ptr_eq(root2.storage()));

        root1.update("pi", Value::Integer(3)).unwrap();
        assert_eq!(root1.lookup("pi"), Ok(Value::Integer(3)));
        assert_eq!(root2.lookup("pi"), Ok(Value::Real(std::f64::consts::PI)));
    }

    #[test]
    fn test_root_bindings() {
        let root = Environment::root();
        let test_cases = vec![
            ("true", Value::Boolean(true)),
            ("false", Value::Boolean(false)),
            ("void", Value::Void),
            ("null", Value::Null),
            ("π", Value::Real(std::f64::consts::PI)),
            ("+", Value::Primitive("+")),
            ("aset!", Value::Primitive("aset!")),
            ("substring", Value::Primitive("substring")),
        ];
        for (i, (name, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(root.lookup(name), Ok(expected), "Root binding test #{}", i + 1);
        }
    }

    #[test]
    fn test_captured_output() {
        let captured = CapturedOutput::new();
        let env = Environment::root_with_output(captured.clone());
        env.output().write_str("hello ").unwrap();
        env.extend(bind(&[("x", Value::Null)]))
            .output()
            .write_str("world")
            .unwrap();
        assert_eq!(captured.contents(), "hello world");
    }
}
