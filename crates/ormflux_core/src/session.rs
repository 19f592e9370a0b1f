use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::connection::SqlResultSet;
use crate::data_object::{DeletionMode, ObjId, ObjectGraph, RelationStatus, Status};
use crate::engine::Engine;
use crate::error::{OrmError, Result};
use crate::expression::{Expr, SelectExpr, find_all_tables};
use crate::schema::{CascadePolicy, Key, Schema};
use crate::value::{Value, Values};

/// Unit-of-work context: an object graph with its identity map, bound to a
/// schema and (usually) an engine. Single-threaded by design.
pub struct Session {
    schema: Arc<Schema>,
    engine: Option<Engine>,
    graph: ObjectGraph,
}

impl Session {
    pub fn new(schema: Arc<Schema>, engine: Option<Engine>) -> Self {
        Self {
            schema,
            engine,
            graph: ObjectGraph::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn engine(&mut self) -> Result<&mut Engine> {
        self.engine
            .as_mut()
            .ok_or_else(|| OrmError::db("session has no engine"))
    }

    /// Allocate a fresh object in this session's arena. The object is not
    /// yet registered; follow up with `save` or assign its key first.
    pub fn new_object(&mut self, table_name: &str, status: Status) -> Result<ObjId> {
        let schema = self.schema.clone();
        self.graph.create(&schema, table_name, status)
    }

    pub fn status(&self, h: ObjId) -> Status {
        self.graph.obj(h).status()
    }

    pub fn depth(&self, h: ObjId) -> i32 {
        self.graph.obj(h).depth()
    }

    pub fn object_key(&mut self, h: ObjId) -> Result<Key> {
        let schema = self.schema.clone();
        self.graph.key(&schema, h)
    }

    /// Register a keyed object in the identity map and attach it. A
    /// different resident object under the same key is an error.
    pub fn save(&mut self, h: ObjId) -> Result<()> {
        let schema = self.schema.clone();
        self.graph.add_to_identity_map(&schema, h, false)?;
        self.graph.set_attached(h, true);
        Ok(())
    }

    /// Like `save`, but when another object already owns the key, its
    /// non-PK fields and status are overwritten from `h`, `h` is released
    /// and the resident handle is returned.
    pub fn save_or_update(&mut self, h: ObjId) -> Result<ObjId> {
        let schema = self.schema.clone();
        let found = self.graph.add_to_identity_map(&schema, h, true)?;
        if found == h {
            self.graph.set_attached(h, true);
            return Ok(h);
        }
        self.graph.copy_non_pk(&schema, h, found)?;
        self.graph.evict(h);
        Ok(found)
    }

    /// Remove the object from the identity map and detach it.
    pub fn detach(&mut self, h: ObjId) -> Result<()> {
        let schema = self.schema.clone();
        if self.graph.assigned_key(&schema, h)? {
            let key_str = self.graph.key_str(&schema, h)?;
            if self.graph.find_by_key_str(&key_str) == Some(h) {
                self.graph.remove_from_identity_map(&key_str);
            }
        }
        self.graph.set_attached(h, false);
        Ok(())
    }

    /// Resident object for the key, or a freshly registered Ghost whose PK
    /// columns carry the key. A fully-null key is permitted, but such a
    /// ghost can never be loaded.
    pub fn get_lazy(&mut self, key: Key) -> Result<ObjId> {
        let key_str = key.key_str();
        if let Some(h) = self.graph.find_by_key_str(&key_str) {
            return Ok(h);
        }
        let schema = self.schema.clone();
        let h = self.graph.create(&schema, &key.table, Status::Ghost)?;
        for (column, value) in key.parts() {
            self.graph.set_value(&schema, h, &column, value)?;
        }
        self.graph.set_attached(h, true);
        self.graph.force_into_identity_map(&schema, h)?;
        Ok(h)
    }

    /// `get_lazy` by surrogate id.
    pub fn get_lazy_by_id(&mut self, table_name: &str, id: i64) -> Result<ObjId> {
        let key = self.schema.table(table_name)?.mk_key_id(id)?;
        self.get_lazy(key)
    }

    fn lazy_load(&mut self, h: ObjId, column: Option<&str>) -> Result<()> {
        if self.graph.obj(h).status() != Status::Ghost {
            return Ok(());
        }
        if let Some(column) = column {
            let schema = self.schema.clone();
            let table = self.graph.table(&schema, h);
            if table.column(column)?.is_pk() {
                return Ok(());
            }
        }
        self.load(h)
    }

    /// Field read; a Ghost is materialized first unless the field is part
    /// of the PK.
    pub fn get(&mut self, h: ObjId, column: &str) -> Result<Value> {
        self.lazy_load(h, Some(column))?;
        let schema = self.schema.clone();
        self.graph.get_value(&schema, h, column)
    }

    /// Field write with the full column rule set.
    pub fn set(&mut self, h: ObjId, column: &str, value: Value) -> Result<()> {
        self.lazy_load(h, Some(column))?;
        let schema = self.schema.clone();
        self.graph.set_value(&schema, h, column, value)
    }

    /// Fetch the object's row by key and fill its columns. Exactly one
    /// row must come back.
    pub fn load(&mut self, h: ObjId) -> Result<()> {
        let schema = self.schema.clone();
        let key = self.graph.key(&schema, h)?;
        if key.is_empty() {
            return Err(OrmError::NullPk(key.table.clone()));
        }
        let table = self.graph.table(&schema, h);
        let table_name = table.name().to_string();
        let cols: Vec<Expr> = table
            .columns()
            .iter()
            .map(|c| Expr::column(table.name(), c.name()))
            .collect();
        let filter = Expr::key_filter(key);
        let filter_sql = filter.get_sql()?;
        let mut rows =
            self.engine()?
                .select(Expr::list(cols), Expr::sql(table_name.clone()), filter)?;
        if rows.len() != 1 {
            return Err(OrmError::ObjectNotFoundByKey(format!(
                "{}({})",
                table_name, filter_sql
            )));
        }
        let mut row = rows.pop().expect("just checked the length");
        self.graph.fill_from_row(&schema, h, &mut row, 0)?;
        Ok(())
    }

    fn relation_idx(
        &self,
        class1: &str,
        relation_name: &str,
        class2: &str,
        prop_side: usize,
    ) -> Result<usize> {
        let rel = self
            .schema
            .find_relation(class1, relation_name, class2, prop_side)?;
        Ok(self.schema.relation_index(rel))
    }

    fn class_of(&self, h: ObjId) -> String {
        self.graph.table(&self.schema, h).class_name().to_string()
    }

    fn link_by_idx(&mut self, master: ObjId, slave: ObjId, relation: usize) -> Result<()> {
        self.lazy_load(slave, None)?;
        let schema = self.schema.clone();
        self.graph.link(&schema, master, slave, relation)
    }

    pub fn link_master_to_slave(
        &mut self,
        master: ObjId,
        slave: ObjId,
        relation_name: &str,
    ) -> Result<()> {
        let relation = self.relation_idx(
            &self.class_of(master),
            relation_name,
            &self.class_of(slave),
            0,
        )?;
        self.link_by_idx(master, slave, relation)
    }

    pub fn link_slave_to_master(
        &mut self,
        slave: ObjId,
        master: ObjId,
        relation_name: &str,
    ) -> Result<()> {
        let relation = self.relation_idx(
            &self.class_of(master),
            relation_name,
            &self.class_of(slave),
            1,
        )?;
        self.link_by_idx(master, slave, relation)
    }

    /// Resolve the master of `slave` under the named relation: compute the
    /// FK key, fetch-or-create the master lazily and link the pair.
    pub fn get_master(&mut self, slave: ObjId, relation_name: &str) -> Result<ObjId> {
        let relation = self.relation_idx(&self.class_of(slave), relation_name, "", 1)?;
        self.lazy_load(slave, None)?;
        let schema = self.schema.clone();
        let fkey = self.graph.fk_value_for(&schema, slave, relation)?;
        let master = self.get_lazy(fkey)?;
        self.graph.link(&schema, master, slave, relation)?;
        Ok(master)
    }

    /// Whether the slave's FK actually points at something.
    pub fn has_master(&mut self, slave: ObjId, relation_name: &str) -> Result<bool> {
        let relation = self.relation_idx(&self.class_of(slave), relation_name, "", 1)?;
        self.lazy_load(slave, None)?;
        let schema = self.schema.clone();
        let fkey = self.graph.fk_value_for(&schema, slave, relation)?;
        Ok(!fkey.is_empty())
    }

    /// Slave handles of the named relation, loading the slave set from the
    /// database on first traversal.
    pub fn get_slaves(&mut self, master: ObjId, relation_name: &str) -> Result<Vec<ObjId>> {
        let relation = self.relation_idx(&self.class_of(master), relation_name, "", 0)?;
        self.load_slaves_if_possible(master, relation)?;
        Ok(self
            .graph
            .get_slaves_ro(master, relation)
            .slaves()
            .to_vec())
    }

    /// Number of slaves; answered from the database when the slave set has
    /// not been traversed yet.
    pub fn count_slaves(&mut self, master: ObjId, relation_name: &str) -> Result<i64> {
        let relation = self.relation_idx(&self.class_of(master), relation_name, "", 0)?;
        if self.graph.relation_status(master, relation) == Some(RelationStatus::Sync) {
            return Ok(self.graph.get_slaves_ro(master, relation).slaves().len() as i64);
        }
        let schema = self.schema.clone();
        let fkey = self.graph.gen_fkey(&schema, master, relation)?;
        let slave_table = schema.relation_at(relation).table_name(1).to_string();
        let count = self.engine()?.select1(
            Expr::sql("COUNT(*) RCNT"),
            Expr::sql(slave_table),
            Expr::key_filter(fkey),
        )?;
        count.as_long_int()
    }

    fn load_slaves_if_possible(&mut self, master: ObjId, relation: usize) -> Result<()> {
        if self.graph.relation_status(master, relation) == Some(RelationStatus::Sync) {
            return Ok(());
        }
        if !self.graph.obj(master).attached() || self.engine.is_none() {
            return Ok(());
        }
        let schema = self.schema.clone();
        let rel = schema.relation_at(relation);
        let slave_table = schema.table(rel.table_name(1))?;
        let slave_table_name = slave_table.name().to_string();
        let cols: Vec<Expr> = slave_table
            .columns()
            .iter()
            .map(|c| Expr::column(slave_table.name(), c.name()))
            .collect();
        let fkey = self.graph.gen_fkey(&schema, master, relation)?;
        let mut select = SelectExpr::new(Expr::list(cols))
            .from_(Expr::sql(slave_table_name))
            .where_(Expr::key_filter(fkey));
        if let Some(order_by) = rel.attr(1, "order-by") {
            select = select.order_by_(Expr::sql(order_by));
        }
        let rows = {
            let mut rs = self.engine()?.select_iter(&select)?;
            rs.fetch_rows(None)?
        };
        for mut row in rows {
            let values: Values = row.iter().map(|(_, v)| v.clone()).collect();
            let (pkey, _) = schema.table(rel.table_name(1))?.mk_key(&values)?;
            let slave = self.get_lazy(pkey)?;
            if self.graph.obj(slave).status() == Status::Ghost {
                self.graph.fill_from_row(&schema, slave, &mut row, 0)?;
            }
            match self.graph.obj(slave).status() {
                Status::ToBeDeleted | Status::Deleted => {}
                _ => self.graph.link(&schema, master, slave, relation)?,
            }
        }
        self.graph
            .set_relation_status(master, relation, RelationStatus::Sync);
        Ok(())
    }

    fn populate_all_master_relations(&mut self, h: ObjId) -> Result<()> {
        let schema = self.schema.clone();
        let table_name = self.graph.table(&schema, h).name().to_string();
        let class_name = self.graph.table(&schema, h).class_name().to_string();
        for &relation in schema.relations_for_class(&class_name) {
            if schema.relation_at(relation).table_name(0) == table_name {
                self.graph.get_slaves_ro(h, relation);
            }
        }
        Ok(())
    }

    /// Two-phase cascading delete: populate and dry-run the master
    /// relations first (Restrict with slaves fails here), then apply.
    pub fn delete_object(&mut self, h: ObjId) -> Result<()> {
        self.delete_object_mode(h, DeletionMode::Normal, 0)
    }

    fn delete_object_mode(&mut self, h: ObjId, mode: DeletionMode, depth: i32) -> Result<()> {
        match self.graph.obj(h).status() {
            Status::ToBeDeleted | Status::Deleted => return Ok(()),
            _ => {}
        }
        if mode != DeletionMode::Unchecked {
            self.populate_all_master_relations(h)?;
            self.delete_master_relations(h, DeletionMode::DryRun, depth + 1)?;
        }
        if mode != DeletionMode::DryRun {
            self.delete_master_relations(h, DeletionMode::Unchecked, depth + 1)?;
            self.graph.exclude_from_slave_relations(h);
            let next = if self.graph.obj(h).status() == Status::New {
                Status::Deleted
            } else {
                Status::ToBeDeleted
            };
            self.graph.set_status(h, next);
        }
        Ok(())
    }

    fn delete_master_relations(&mut self, h: ObjId, mode: DeletionMode, depth: i32) -> Result<()> {
        for relation in self.graph.obj(h).master_relation_indexes() {
            self.delete_relation_master(h, relation, mode, depth)?;
        }
        if mode != DeletionMode::DryRun {
            self.graph.clear_master_relations(h);
        }
        Ok(())
    }

    fn delete_relation_master(
        &mut self,
        master: ObjId,
        relation: usize,
        mode: DeletionMode,
        depth: i32,
    ) -> Result<()> {
        if mode == DeletionMode::DryRun {
            self.load_slaves_if_possible(master, relation)?;
        }
        let schema = self.schema.clone();
        let slaves = self
            .graph
            .obj(master)
            .master_relation(relation)
            .map(|ro| ro.slaves().to_vec())
            .unwrap_or_default();
        match schema.relation_at(relation).cascade() {
            CascadePolicy::Nullify => {
                if mode != DeletionMode::DryRun {
                    for slave in slaves {
                        self.graph.set_free_from(&schema, slave, relation)?;
                    }
                    self.graph.clear_relation_slaves(master, relation);
                }
            }
            CascadePolicy::Delete => {
                for slave in slaves {
                    self.delete_object_mode(slave, mode, depth)?;
                }
            }
            CascadePolicy::Restrict => {
                if !slaves.is_empty() {
                    return Err(OrmError::CascadeDelete(
                        schema.relation_at(relation).descr(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Lazily stream tuples of objects for a multi-table FROM expression.
    pub fn load_collection(
        &mut self,
        from: Expr,
        filter: Expr,
        order_by: Expr,
        for_update: bool,
    ) -> Result<DataObjectResultSet<'_>> {
        let schema = self.schema.clone();
        let mut tables = Vec::new();
        find_all_tables(&from, &mut tables)?;
        let mut cols = Vec::new();
        for name in &tables {
            let table = schema.table(name)?;
            for column in table.columns() {
                cols.push(Expr::column(table.name(), column.name()));
            }
        }
        let select = SelectExpr::new(Expr::list(cols))
            .from_(from)
            .where_(filter)
            .order_by_(order_by)
            .for_update(for_update);
        let rs = self.engine()?.select_iter(&select)?;
        Ok(DataObjectResultSet {
            session: self,
            rs,
            tables,
        })
    }

    /// Buffered variant of `load_collection` yielding only the first
    /// table's objects.
    pub fn load_collection_into(
        &mut self,
        from: Expr,
        filter: Expr,
        order_by: Expr,
        for_update: bool,
    ) -> Result<Vec<ObjId>> {
        let mut rs = self.load_collection(from, filter, order_by, for_update)?;
        let mut out = Vec::new();
        while let Some(row) = rs.fetch()? {
            out.push(row[0]);
        }
        Ok(out)
    }

    fn flush_tbl_new_keyed(&mut self, table_name: &str, objs: &[ObjId]) -> Result<()> {
        if objs.is_empty() {
            return Ok(());
        }
        let schema = self.schema.clone();
        let mut rows: Vec<Values> = Vec::with_capacity(objs.len());
        for &h in objs {
            self.graph.refresh_master_fkeys(&schema, h)?;
            rows.push(self.graph.obj(h).raw_values().clone());
            self.graph.add_to_identity_map(&schema, h, true)?;
        }
        let table = schema.table(table_name)?;
        self.engine()?.insert(table, &rows, false)?;
        Ok(())
    }

    fn flush_tbl_new_unkeyed(&mut self, table_name: &str, objs: &[ObjId]) -> Result<()> {
        if objs.is_empty() {
            return Ok(());
        }
        let schema = self.schema.clone();
        let table = schema.table(table_name)?;
        let has_seq = self.engine()?.dialect().has_sequences();
        let use_seq = has_seq && table.seq_name().is_some();
        let use_autoinc = !has_seq && (table.autoinc() || table.seq_name().is_some());
        if use_seq {
            let pk = table.surrogate_pk()?.to_string();
            let seq = table.seq_name().expect("use_seq checked").to_string();
            for &h in objs {
                let id = self.engine()?.get_next_value(&seq)?;
                self.graph.set_value(&schema, h, &pk, Value::LongInt(id))?;
            }
        }
        let mut rows: Vec<Values> = Vec::with_capacity(objs.len());
        for &h in objs {
            self.graph.refresh_master_fkeys(&schema, h)?;
            rows.push(self.graph.obj(h).raw_values().clone());
        }
        let ids = self.engine()?.insert(table, &rows, use_autoinc)?;
        if use_autoinc {
            let pk = table.surrogate_pk()?.to_string();
            for (&h, id) in objs.iter().zip(ids) {
                self.graph.set_value(&schema, h, &pk, Value::LongInt(id))?;
            }
        }
        for &h in objs {
            self.graph.refresh_slaves_fkeys(&schema, h)?;
            self.graph.add_to_identity_map(&schema, h, false)?;
        }
        Ok(())
    }

    fn flush_new(&mut self) -> Result<()> {
        let news: Vec<ObjId> = self
            .graph
            .handles()
            .into_iter()
            .filter(|&h| self.graph.obj(h).status() == Status::New)
            .collect();
        if news.is_empty() {
            return Ok(());
        }
        for &h in &news {
            self.graph.set_depth(h, -1);
        }
        for &h in &news {
            self.graph.calc_depth(h, 0, None)?;
        }
        let schema = self.schema.clone();
        let mut groups: BTreeMap<i32, BTreeMap<String, Vec<ObjId>>> = BTreeMap::new();
        for &h in &news {
            let depth = self.graph.obj(h).depth();
            let table_name = self.graph.table(&schema, h).name().to_string();
            groups
                .entry(depth)
                .or_default()
                .entry(table_name)
                .or_default()
                .push(h);
        }
        for by_table in groups.values() {
            for (table_name, objs) in by_table {
                let mut keyed = Vec::new();
                let mut unkeyed = Vec::new();
                for &h in objs {
                    if self.graph.assigned_key(&schema, h)? {
                        keyed.push(h);
                    } else {
                        unkeyed.push(h);
                    }
                }
                self.flush_tbl_new_keyed(table_name, &keyed)?;
                self.flush_tbl_new_unkeyed(table_name, &unkeyed)?;
            }
        }
        for &h in &news {
            if self.graph.contains(h) && self.graph.obj(h).status() == Status::New {
                self.graph.set_status(h, Status::Ghost);
            }
        }
        Ok(())
    }

    fn flush_update(&mut self, snapshot: &[ObjId]) -> Result<()> {
        let schema = self.schema.clone();
        let mut by_table: BTreeMap<String, Vec<Values>> = BTreeMap::new();
        for &h in snapshot {
            if !self.graph.contains(h) || self.graph.obj(h).status() != Status::Dirty {
                continue;
            }
            self.graph.refresh_master_fkeys(&schema, h)?;
            let table_name = self.graph.table(&schema, h).name().to_string();
            by_table
                .entry(table_name)
                .or_default()
                .push(self.graph.obj(h).raw_values().clone());
            self.graph.set_status(h, Status::Ghost);
        }
        for (table_name, rows) in by_table {
            let table = schema.table(&table_name)?;
            self.engine()?.update(table, &rows)?;
        }
        Ok(())
    }

    fn flush_delete(&mut self, snapshot: &[ObjId]) -> Result<()> {
        let schema = self.schema.clone();
        let mut groups: BTreeMap<i32, BTreeMap<String, Vec<Key>>> = BTreeMap::new();
        for &h in snapshot {
            if !self.graph.contains(h) || self.graph.obj(h).status() != Status::ToBeDeleted {
                continue;
            }
            let depth = self.graph.obj(h).depth();
            let table_name = self.graph.table(&schema, h).name().to_string();
            let key = self.graph.key(&schema, h)?;
            groups
                .entry(depth)
                .or_default()
                .entry(table_name)
                .or_default()
                .push(key);
            self.graph.set_status(h, Status::Deleted);
        }
        for (depth, by_table) in groups.iter().rev() {
            debug!("flush_delete: depth: {}", depth);
            for (table_name, keys) in by_table {
                debug!("flush_delete: table: {}", table_name);
                let table = schema.table(table_name)?;
                self.engine()?.delete_from(table, keys)?;
            }
        }
        Ok(())
    }

    /// Write out pending changes: inserts in dependency order, then
    /// updates, then deletes in reverse dependency order. No-op when
    /// nothing changed; errors propagate and leave objects in their
    /// post-phase states for the caller to roll back.
    pub fn flush(&mut self) -> Result<()> {
        debug!("flush started");
        let result = self.flush_inner();
        match &result {
            Ok(()) => debug!("flush finished OK"),
            Err(_) => debug!("flush finished with an ERROR"),
        }
        result
    }

    fn flush_inner(&mut self) -> Result<()> {
        let snapshot = self.graph.identity_map_handles();
        self.flush_new()?;
        self.flush_update(&snapshot)?;
        self.flush_delete(&snapshot)?;
        for h in self.graph.handles() {
            if self.graph.obj(h).status() == Status::Deleted {
                self.graph.set_attached(h, false);
                self.graph.evict(h);
            }
        }
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.flush()?;
        self.engine()?.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.engine()?.rollback()
    }

    /// Drop every object and roll back the engine.
    pub fn clear(&mut self) {
        self.graph.clear();
        if let Some(engine) = self.engine.as_mut() {
            let _ = engine.rollback();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Lazy sequence of per-row object tuples produced by `load_collection`.
/// Each fetched row is split into one object per referenced table, and
/// each object is promoted through the identity map.
pub struct DataObjectResultSet<'s> {
    session: &'s mut Session,
    rs: SqlResultSet<'static>,
    tables: Vec<String>,
}

impl DataObjectResultSet<'_> {
    pub fn fetch(&mut self) -> Result<Option<Vec<ObjId>>> {
        let Some(mut row) = self.rs.fetch()? else {
            return Ok(None);
        };
        let schema = self.session.schema.clone();
        let mut handles = Vec::with_capacity(self.tables.len());
        let mut pos = 0;
        for name in &self.tables {
            let h = self.session.graph.create(&schema, name, Status::Sync)?;
            pos = self.session.graph.fill_from_row(&schema, h, &mut row, pos)?;
            handles.push(self.session.save_or_update(h)?);
        }
        Ok(Some(handles))
    }
}
