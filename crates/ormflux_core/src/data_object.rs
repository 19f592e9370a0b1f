//! The mapped object graph: `DataObject` nodes interconnected through
//! `RelationObject` edges, stored in an arena and addressed by opaque
//! handles. Everything here is pure graph manipulation; statement I/O
//! (lazy loading, flushing) is driven by the session.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::{OrmError, Result};
use crate::schema::{Key, Schema, Table};
use crate::value::{Row, Value, Values, ValueType};

/// Opaque handle of a `DataObject` within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(usize);

/// Persistence state of one mapped object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Ghost,
    Dirty,
    Sync,
    ToBeDeleted,
    Deleted,
}

/// Whether a relation's slave set has been fully loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationStatus {
    Incomplete,
    Sync,
}

/// Phases of the two-phase cascading delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionMode {
    Normal,
    DryRun,
    Unchecked,
}

/// One mapped row. Values are stored in column order; the key and its
/// canonical string are cached and recomputed on PK writes.
#[derive(Debug)]
pub struct DataObject {
    table: usize,
    values: Values,
    status: Status,
    key: Option<Key>,
    key_str: String,
    assigned_key: bool,
    depth: i32,
    attached: bool,
    master_relations: IndexMap<usize, RelationObject>,
    slave_relations: IndexMap<usize, ObjId>,
}

impl DataObject {
    fn new(table: usize, width: usize, status: Status) -> Self {
        Self {
            table,
            values: vec![Value::Null; width],
            status,
            key: None,
            key_str: String::new(),
            assigned_key: false,
            depth: 0,
            attached: false,
            master_relations: IndexMap::new(),
            slave_relations: IndexMap::new(),
        }
    }

    pub fn table_index(&self) -> usize {
        self.table
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn attached(&self) -> bool {
        self.attached
    }

    pub fn raw_values(&self) -> &Values {
        &self.values
    }

    pub fn master_relation(&self, relation: usize) -> Option<&RelationObject> {
        self.master_relations.get(&relation)
    }

    pub fn master_relation_indexes(&self) -> Vec<usize> {
        self.master_relations.keys().copied().collect()
    }

    pub fn slave_relations(&self) -> impl Iterator<Item = (usize, ObjId)> + '_ {
        self.slave_relations.iter().map(|(&r, &m)| (r, m))
    }

    /// Sync objects become Dirty on mutation; other states keep theirs.
    fn touch(&mut self) {
        if self.status == Status::Sync {
            self.status = Status::Dirty;
        }
    }

    fn update_key(&mut self, table: &Table) -> Result<()> {
        let (key, assigned) = table.mk_key(&self.values)?;
        self.key_str = key.key_str();
        self.key = Some(key);
        self.assigned_key = assigned;
        Ok(())
    }
}

/// The "one" side's view of a one-to-many edge: an insertion-ordered,
/// deduplicated set of slave handles owned by the master object.
#[derive(Debug)]
pub struct RelationObject {
    relation: usize,
    master: ObjId,
    slaves: Vec<ObjId>,
    slave_index: HashMap<ObjId, usize>,
    status: RelationStatus,
}

impl RelationObject {
    fn new(relation: usize, master: ObjId) -> Self {
        Self {
            relation,
            master,
            slaves: Vec::new(),
            slave_index: HashMap::new(),
            status: RelationStatus::Incomplete,
        }
    }

    pub fn relation_index(&self) -> usize {
        self.relation
    }

    pub fn master(&self) -> ObjId {
        self.master
    }

    pub fn slaves(&self) -> &[ObjId] {
        &self.slaves
    }

    pub fn status(&self) -> RelationStatus {
        self.status
    }

    fn add_slave(&mut self, slave: ObjId) -> bool {
        if self.slave_index.contains_key(&slave) {
            return false;
        }
        self.slave_index.insert(slave, self.slaves.len());
        self.slaves.push(slave);
        true
    }

    fn remove_slave(&mut self, slave: ObjId) -> bool {
        let Some(pos) = self.slave_index.remove(&slave) else {
            return false;
        };
        self.slaves.remove(pos);
        for (i, s) in self.slaves.iter().enumerate().skip(pos) {
            self.slave_index.insert(*s, i);
        }
        true
    }
}

/// Arena of data objects plus the identity map over canonical key strings.
#[derive(Default)]
pub struct ObjectGraph {
    objects: Vec<Option<DataObject>>,
    free: Vec<usize>,
    identity_map: IndexMap<String, ObjId>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, schema: &Schema, table_name: &str, status: Status) -> Result<ObjId> {
        let table_idx = schema.table_index(table_name)?;
        let width = schema.table_at(table_idx).size();
        let obj = DataObject::new(table_idx, width, status);
        Ok(self.insert(obj))
    }

    fn insert(&mut self, obj: DataObject) -> ObjId {
        match self.free.pop() {
            Some(slot) => {
                self.objects[slot] = Some(obj);
                ObjId(slot)
            }
            None => {
                self.objects.push(Some(obj));
                ObjId(self.objects.len() - 1)
            }
        }
    }

    pub fn obj(&self, h: ObjId) -> &DataObject {
        self.objects[h.0].as_ref().expect("live object handle")
    }

    pub fn obj_mut(&mut self, h: ObjId) -> &mut DataObject {
        self.objects[h.0].as_mut().expect("live object handle")
    }

    pub fn contains(&self, h: ObjId) -> bool {
        self.objects.get(h.0).map_or(false, Option::is_some)
    }

    /// Live handles in allocation order.
    pub fn handles(&self) -> Vec<ObjId> {
        self.objects
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().map(|_| ObjId(i)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.iter().filter(|o| o.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table<'s>(&self, schema: &'s Schema, h: ObjId) -> &'s Table {
        schema.table_at(self.obj(h).table)
    }

    pub fn set_status(&mut self, h: ObjId, status: Status) {
        self.obj_mut(h).status = status;
    }

    pub fn set_attached(&mut self, h: ObjId, attached: bool) {
        self.obj_mut(h).attached = attached;
    }

    pub fn set_depth(&mut self, h: ObjId, depth: i32) {
        self.obj_mut(h).depth = depth;
    }

    /// Column read without lazy materialization.
    pub fn get_value(&self, schema: &Schema, h: ObjId, name: &str) -> Result<Value> {
        let obj = self.obj(h);
        let i = schema.table_at(obj.table).idx_by_name(name)?;
        Ok(obj.values[i].clone())
    }

    pub fn get_value_at(&self, h: ObjId, i: usize) -> Value {
        self.obj(h).values[i].clone()
    }

    /// Column write with the full rule set: read-only rejection (a PK may
    /// be filled in while null), type coercion, string length check, key
    /// recomputation on PK change and dirty-marking otherwise.
    pub fn set_value(&mut self, schema: &Schema, h: ObjId, name: &str, v: Value) -> Result<()> {
        let table = schema.table_at(self.obj(h).table);
        let i = table.idx_by_name(name)?;
        self.set_value_at(schema, h, i, v)
    }

    pub fn set_value_at(
        &mut self,
        schema: &Schema,
        h: ObjId,
        i: usize,
        v: Value,
    ) -> Result<()> {
        let table = schema.table_at(self.obj(h).table);
        let column = table.column_at(i);
        if column.is_ro() && !column.is_pk() {
            return Err(OrmError::ReadOnlyColumn {
                table: table.name().to_string(),
                column: column.name().to_string(),
            });
        }
        let mut new_v = v;
        new_v.fix_type(column.ty())?;
        if column.ty() == ValueType::Str {
            if let Value::Str(s) = &new_v {
                if column.size() > 0 && column.size() < s.chars().count() {
                    return Err(OrmError::StringTooLong {
                        table: table.name().to_string(),
                        column: column.name().to_string(),
                        max_len: column.size(),
                        value: s.clone(),
                    });
                }
            }
        }
        let obj = self.objects[h.0].as_mut().expect("live object handle");
        let equal = obj.values[i] == new_v;
        if column.is_pk() && obj.attached && !equal && !obj.values[i].is_null() {
            return Err(OrmError::ReadOnlyColumn {
                table: table.name().to_string(),
                column: column.name().to_string(),
            });
        }
        if !equal {
            obj.values[i] = new_v;
            if column.is_pk() {
                obj.update_key(table)?;
            } else {
                obj.touch();
            }
        }
        Ok(())
    }

    pub fn key(&mut self, schema: &Schema, h: ObjId) -> Result<Key> {
        self.refresh_key(schema, h)?;
        Ok(self.obj(h).key.clone().expect("key just refreshed"))
    }

    pub fn key_str(&mut self, schema: &Schema, h: ObjId) -> Result<String> {
        self.refresh_key(schema, h)?;
        Ok(self.obj(h).key_str.clone())
    }

    pub fn assigned_key(&mut self, schema: &Schema, h: ObjId) -> Result<bool> {
        self.refresh_key(schema, h)?;
        Ok(self.obj(h).assigned_key)
    }

    fn refresh_key(&mut self, schema: &Schema, h: ObjId) -> Result<()> {
        let table = schema.table_at(self.obj(h).table);
        if self.obj(h).key.is_none() {
            self.obj_mut(h).update_key(table)?;
        }
        Ok(())
    }

    /// Move column values out of a fetched row (starting at `offset`) into
    /// the object, coercing per declared type; the object becomes Sync.
    /// Returns the offset one past the consumed columns.
    pub fn fill_from_row(
        &mut self,
        schema: &Schema,
        h: ObjId,
        row: &mut Row,
        offset: usize,
    ) -> Result<usize> {
        let table = schema.table_at(self.obj(h).table);
        let width = table.size();
        for i in 0..width {
            let mut v = Value::Null;
            v.swap(&mut row[offset + i].1);
            v.fix_type(table.column_at(i).ty())?;
            self.obj_mut(h).values[i] = v;
        }
        let table = schema.table_at(self.obj(h).table);
        self.obj_mut(h).update_key(table)?;
        self.obj_mut(h).status = Status::Sync;
        Ok(offset + width)
    }

    /// The key of this slave's master under `relation`: master-table PK
    /// names carrying the slave's FK values.
    pub fn fk_value_for(&self, schema: &Schema, slave: ObjId, relation: usize) -> Result<Key> {
        let rel = schema.relation_at(relation);
        let master_table = schema.table(rel.table_name(0))?;
        let slave_table = schema.table_at(self.obj(slave).table);
        let mut fields = Vec::new();
        for (fk, pk) in rel.fk_fields().iter().zip(master_table.pk_fields()) {
            let i = slave_table.idx_by_name(fk)?;
            fields.push((pk.clone(), self.obj(slave).values[i].clone()));
        }
        Ok(Key::fields(master_table.name(), fields))
    }

    /// The slave-table key image used to filter a relation's slave rows:
    /// FK column names carrying the master's PK values.
    pub fn gen_fkey(&self, schema: &Schema, master: ObjId, relation: usize) -> Result<Key> {
        let rel = schema.relation_at(relation);
        let master_table = schema.table(rel.table_name(0))?;
        let slave_table = schema.table(rel.table_name(1))?;
        let mut fields = Vec::new();
        for (fk, pk) in rel.fk_fields().iter().zip(master_table.pk_fields()) {
            let i = master_table.idx_by_name(pk)?;
            fields.push((fk.clone(), self.obj(master).values[i].clone()));
        }
        Ok(Key::fields(slave_table.name(), fields))
    }

    /// Find or create the master-side relation object.
    pub fn get_slaves_ro(&mut self, master: ObjId, relation: usize) -> &mut RelationObject {
        let obj = self.objects[master.0].as_mut().expect("live object handle");
        obj.master_relations
            .entry(relation)
            .or_insert_with(|| RelationObject::new(relation, master))
    }

    pub fn relation_status(&self, master: ObjId, relation: usize) -> Option<RelationStatus> {
        self.obj(master).master_relations.get(&relation).map(|ro| ro.status)
    }

    pub fn set_relation_status(&mut self, master: ObjId, relation: usize, status: RelationStatus) {
        self.get_slaves_ro(master, relation).status = status;
    }

    /// Canonical linking of a master/slave pair under a relation. The
    /// slave is detached from any previous master on the same relation,
    /// deduplicated into the master's slave list, depth-adjusted (a link
    /// that would revisit the master reports a cycle) and its FK columns
    /// are synchronized with the master's key.
    pub fn link(
        &mut self,
        schema: &Schema,
        master: ObjId,
        slave: ObjId,
        relation: usize,
    ) -> Result<()> {
        if let Some(&prev_master) = self.obj(slave).slave_relations.get(&relation) {
            if prev_master != master {
                if let Some(ro) = self.obj_mut(prev_master).master_relations.get_mut(&relation) {
                    ro.remove_slave(slave);
                }
                self.obj_mut(slave).slave_relations.shift_remove(&relation);
            }
        }
        if self.get_slaves_ro(master, relation).add_slave(slave) {
            self.obj_mut(slave).slave_relations.insert(relation, master);
        }
        let master_depth = self.obj(master).depth;
        self.calc_depth(slave, master_depth + 1, Some(master))?;

        let rel = schema.relation_at(relation);
        let fk_fields: Vec<String> = rel.fk_fields().to_vec();
        if self.assigned_key(schema, master)? {
            let pkey = self.key(schema, master)?;
            for (fk, (_, value)) in fk_fields.iter().zip(pkey.parts()) {
                self.set_value(schema, slave, fk, value)?;
            }
        } else if self.obj(slave).status == Status::Sync
            && (self.obj(master).status == Status::New
                || self.fk_value_for(schema, slave, relation)? != self.key(schema, master)?)
        {
            self.obj_mut(slave).touch();
        }
        Ok(())
    }

    /// Raise this object's depth to at least `d`, propagating `d + 1`
    /// through its master relations. Reaching `parent` again means the
    /// link being established closes a cycle.
    pub fn calc_depth(&mut self, h: ObjId, d: i32, parent: Option<ObjId>) -> Result<()> {
        if d <= self.obj(h).depth {
            return Ok(());
        }
        self.obj_mut(h).depth = d;
        let slave_sets: Vec<Vec<ObjId>> = self
            .obj(h)
            .master_relations
            .values()
            .map(|ro| ro.slaves.clone())
            .collect();
        for slaves in slave_sets {
            for slave in slaves {
                if Some(slave) == parent {
                    return Err(OrmError::CycleDetected);
                }
                self.calc_depth(slave, d + 1, parent)?;
            }
        }
        Ok(())
    }

    /// Copy this master's PK values into the FK columns of every slave of
    /// every relation it masters.
    pub fn refresh_slaves_fkeys(&mut self, schema: &Schema, master: ObjId) -> Result<()> {
        let relations: Vec<usize> = self.obj(master).master_relations.keys().copied().collect();
        for relation in relations {
            self.refresh_relation_fkeys(schema, master, relation)?;
        }
        Ok(())
    }

    pub fn refresh_relation_fkeys(
        &mut self,
        schema: &Schema,
        master: ObjId,
        relation: usize,
    ) -> Result<()> {
        let rel = schema.relation_at(relation);
        let fk_fields: Vec<String> = rel.fk_fields().to_vec();
        let pk_fields: Vec<String> = schema.table(rel.table_name(0))?.pk_fields().to_vec();
        let slaves = self
            .obj(master)
            .master_relations
            .get(&relation)
            .map(|ro| ro.slaves.clone())
            .unwrap_or_default();
        for slave in slaves {
            for (fk, pk) in fk_fields.iter().zip(&pk_fields) {
                let value = self.get_value(schema, master, pk)?;
                self.set_value(schema, slave, fk, value)?;
            }
        }
        Ok(())
    }

    /// For each relation where this object is a slave, re-copy the
    /// master's PK into the FK columns of that relation's slaves.
    pub fn refresh_master_fkeys(&mut self, schema: &Schema, slave: ObjId) -> Result<()> {
        let edges: Vec<(usize, ObjId)> = self.obj(slave).slave_relations().collect();
        for (relation, master) in edges {
            self.refresh_relation_fkeys(schema, master, relation)?;
        }
        Ok(())
    }

    /// Clear the FK columns binding `slave` to the given relation. An FK
    /// column that participates in the slave's own PK cannot be nulled.
    pub fn set_free_from(&mut self, schema: &Schema, slave: ObjId, relation: usize) -> Result<()> {
        let rel = schema.relation_at(relation);
        let fk_fields: Vec<String> = rel.fk_fields().to_vec();
        let slave_table = schema.table_at(self.obj(slave).table);
        for fk in &fk_fields {
            if slave_table.column(fk)?.is_pk() {
                return Err(OrmError::CascadeDelete(rel.descr()));
            }
        }
        for fk in &fk_fields {
            self.set_value(schema, slave, fk, Value::Null)?;
        }
        self.obj_mut(slave).slave_relations.shift_remove(&relation);
        Ok(())
    }

    /// Empty one relation's slave list without touching the slaves' data.
    pub fn clear_relation_slaves(&mut self, master: ObjId, relation: usize) {
        let ro = self.get_slaves_ro(master, relation);
        ro.slaves.clear();
        ro.slave_index.clear();
    }

    /// Overwrite the non-PK columns and the status of `to` with those of
    /// `from` (both of the same table). Used when a freshly fetched object
    /// turns out to be already resident under its key.
    pub fn copy_non_pk(&mut self, schema: &Schema, from: ObjId, to: ObjId) -> Result<()> {
        let table = schema.table_at(self.obj(from).table);
        let mut values = Vec::new();
        for (i, column) in table.columns().iter().enumerate() {
            if !column.is_pk() {
                values.push((i, self.obj(from).values[i].clone()));
            }
        }
        let status = self.obj(from).status;
        let to_obj = self.obj_mut(to);
        for (i, v) in values {
            to_obj.values[i] = v;
        }
        to_obj.status = status;
        Ok(())
    }

    /// Drop this object out of every relation where it is a slave.
    pub fn exclude_from_slave_relations(&mut self, h: ObjId) {
        let edges: Vec<(usize, ObjId)> = self.obj(h).slave_relations().collect();
        for (relation, master) in edges {
            if let Some(ro) = self.obj_mut(master).master_relations.get_mut(&relation) {
                ro.remove_slave(h);
            }
        }
        self.obj_mut(h).slave_relations.clear();
    }

    /// Drop all master-side relation objects, unregistering the back
    /// edges of their slaves.
    pub fn clear_master_relations(&mut self, h: ObjId) {
        let relations: Vec<(usize, Vec<ObjId>)> = self
            .obj(h)
            .master_relations
            .iter()
            .map(|(&r, ro)| (r, ro.slaves.clone()))
            .collect();
        for (relation, slaves) in relations {
            for slave in slaves {
                self.obj_mut(slave).slave_relations.shift_remove(&relation);
            }
        }
        self.obj_mut(h).master_relations.clear();
    }

    // -- identity map --

    /// Register a keyed object. When another object already holds the
    /// key, either report it (`return_found`) or fail.
    pub fn add_to_identity_map(
        &mut self,
        schema: &Schema,
        h: ObjId,
        return_found: bool,
    ) -> Result<ObjId> {
        if self.assigned_key(schema, h)? {
            let key_str = self.obj(h).key_str.clone();
            if let Some(&found) = self.identity_map.get(&key_str) {
                if found != h {
                    if return_found {
                        return Ok(found);
                    }
                    return Err(OrmError::AlreadyInSession(key_str));
                }
                return Ok(h);
            }
            self.identity_map.insert(key_str, h);
        }
        Ok(h)
    }

    /// Register under the key string even when unassigned (ghosts of null
    /// keys share one entry).
    pub fn force_into_identity_map(&mut self, schema: &Schema, h: ObjId) -> Result<()> {
        let key_str = self.key_str(schema, h)?;
        self.identity_map.insert(key_str, h);
        Ok(())
    }

    pub fn find_by_key_str(&self, key_str: &str) -> Option<ObjId> {
        self.identity_map.get(key_str).copied()
    }

    pub fn identity_map_handles(&self) -> Vec<ObjId> {
        self.identity_map.values().copied().collect()
    }

    pub fn remove_from_identity_map(&mut self, key_str: &str) {
        self.identity_map.shift_remove(key_str);
    }

    /// Free the storage of an object, dropping its identity-map entry and
    /// every edge that still points at it.
    pub fn evict(&mut self, h: ObjId) {
        self.exclude_from_slave_relations(h);
        self.clear_master_relations(h);
        let key_str = self.obj(h).key_str.clone();
        if self.identity_map.get(&key_str) == Some(&h) {
            self.identity_map.shift_remove(&key_str);
        }
        self.objects[h.0] = None;
        self.free.push(h.0);
    }

    /// Drop every object and identity-map entry.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.free.clear();
        self.identity_map.clear();
    }
}
