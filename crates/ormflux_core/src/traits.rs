use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{OrmError, Result};
use crate::source::SqlSource;
use crate::sql_dialect::SqlDialect;
use crate::value::{Row, Value, ValueType};

/// One prepared or direct statement on a connection.
///
/// A cursor owns its prepared statement; preparing again replaces and
/// releases the previous one. Implementations report rows with column
/// names exactly as the backend produced them; the wrapping layer
/// upper-cases them.
pub trait SqlCursorBackend: Send {
    fn exec_direct(&mut self, sql: &str) -> Result<()>;

    fn prepare(&mut self, sql: &str) -> Result<()>;

    /// Optional type pre-binding; parameter binding must honor each
    /// value's declared type code.
    fn bind_params(&mut self, _types: &[ValueType]) -> Result<()> {
        Ok(())
    }

    fn exec(&mut self, params: &[Value]) -> Result<()>;

    /// Next row of the current result, or `None` at end-of-results.
    fn fetch_row(&mut self) -> Result<Option<Row>>;
}

/// One open connection produced by a driver. Single-threaded use.
pub trait SqlConnectionBackend: Send {
    fn open(&mut self, dialect: &dyn SqlDialect, source: &SqlSource) -> Result<()>;

    /// Adopt a foreign connection handle instead of opening one.
    fn use_raw(&mut self, _dialect: &dyn SqlDialect, _raw: Box<dyn Any>) -> Result<()> {
        Err(OrmError::driver("Raw connection handles not supported"))
    }

    fn close(&mut self) -> Result<()>;

    fn begin_trans(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn new_cursor(&mut self) -> Result<Box<dyn SqlCursorBackend>>;
}

/// Factory for connection backends.
///
/// A driver whose native handle creation is not thread-safe must serialize
/// it internally (a mutex around `create_backend` is enough); callers
/// assume `create_backend` may be invoked from any thread.
pub trait SqlDriver: Send + Sync {
    fn name(&self) -> &str;

    fn create_backend(&self) -> Result<Box<dyn SqlConnectionBackend>>;

    /// Whether statements must be preceded by an explicit BEGIN.
    fn explicit_begin_trans_required(&self) -> bool {
        true
    }

    /// Whether the driver wants `:1 … :n` placeholders instead of `?`.
    fn numbered_params(&self) -> bool {
        false
    }
}

/// Explicit driver registry; `""` and `"DEFAULT"` resolve to the
/// designated (or first registered) driver.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    items: IndexMap<String, Arc<dyn SqlDriver>>,
    default_name: Option<String>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Arc<dyn SqlDriver>) -> bool {
        let name = driver.name().to_uppercase();
        if self.items.contains_key(&name) {
            return false;
        }
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.items.insert(name, driver);
        true
    }

    pub fn set_default(&mut self, name: &str) {
        self.default_name = Some(name.to_uppercase());
    }

    pub fn find(&self, name: &str) -> Result<Arc<dyn SqlDriver>> {
        let name = if name.is_empty() || name.eq_ignore_ascii_case("DEFAULT") {
            self.default_name
                .clone()
                .ok_or_else(|| OrmError::UnknownDriver("DEFAULT".to_string()))?
        } else {
            name.to_uppercase()
        };
        self.items
            .get(&name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownDriver(name))
    }

    pub fn list(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDriver(&'static str);

    impl SqlDriver for NullDriver {
        fn name(&self) -> &str {
            self.0
        }

        fn create_backend(&self) -> Result<Box<dyn SqlConnectionBackend>> {
            Err(OrmError::driver("not connectable"))
        }
    }

    #[test]
    fn default_resolves_to_first_registered() {
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(NullDriver("ODBC")));
        registry.register(Arc::new(NullDriver("QTSQL")));
        assert_eq!(registry.find("").unwrap().name(), "ODBC");
        assert_eq!(registry.find("DEFAULT").unwrap().name(), "ODBC");
        assert_eq!(registry.find("qtsql").unwrap().name(), "QTSQL");
        registry.set_default("QTSQL");
        assert_eq!(registry.find("DEFAULT").unwrap().name(), "QTSQL");
    }

    #[test]
    fn unknown_driver_is_reported() {
        let registry = DriverRegistry::new();
        assert!(matches!(
            registry.find("ODBC"),
            Err(OrmError::UnknownDriver(_))
        ));
    }
}
