use std::collections::{HashMap, HashSet};
use std::fmt;

use bitflags::bitflags;
use indexmap::IndexMap;

use crate::error::{OrmError, Result};
use crate::value::{Value, ValueType};

bitflags! {
    /// Column behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ColumnFlags: u32 {
        const PRIMARY_KEY = 1 << 0;
        const READ_ONLY = 1 << 1;
        const NULLABLE = 1 << 2;
    }
}

/// Column metadata. Columns are owned by their table; operations that need
/// the containing table take it as a parameter.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    ty: ValueType,
    size: usize,
    flags: ColumnFlags,
    fk: Option<(String, String)>,
    xml_name: String,
    prop_name: String,
    index_name: Option<String>,
    default_value: Value,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ValueType, size: usize, flags: ColumnFlags) -> Self {
        let name = name.into();
        let xml_name = mk_xml_name(&name);
        let prop_name = name.to_lowercase();
        Self {
            name,
            ty,
            size,
            flags,
            fk: None,
            xml_name,
            prop_name,
            index_name: None,
            default_value: Value::Null,
        }
    }

    pub fn with_fk(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.fk = Some((table.into(), column.into()));
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = value;
        self
    }

    pub fn with_xml_name(mut self, xml_name: impl Into<String>) -> Self {
        self.xml_name = xml_name.into();
        self
    }

    pub fn with_prop_name(mut self, prop_name: impl Into<String>) -> Self {
        self.prop_name = prop_name.into();
        self
    }

    pub fn with_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    pub fn is_pk(&self) -> bool {
        self.flags.contains(ColumnFlags::PRIMARY_KEY)
    }

    pub fn is_ro(&self) -> bool {
        self.flags.contains(ColumnFlags::READ_ONLY)
    }

    pub fn is_nullable(&self) -> bool {
        self.flags.contains(ColumnFlags::NULLABLE)
    }

    pub fn has_fk(&self) -> bool {
        self.fk.is_some()
    }

    pub fn fk_table_name(&self) -> Option<&str> {
        self.fk.as_ref().map(|(t, _)| t.as_str())
    }

    pub fn fk_column_name(&self) -> Option<&str> {
        self.fk.as_ref().map(|(_, c)| c.as_str())
    }

    pub fn xml_name(&self) -> &str {
        &self.xml_name
    }

    pub fn prop_name(&self) -> &str {
        &self.prop_name
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }
}

/// XML/display name derived from a SQL identifier: lower case, dashes.
pub fn mk_xml_name(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

/// Identity of one row: the table name plus either the surrogate PK column
/// with its (possibly unassigned) integer value, or the ordered composite
/// PK image.
#[derive(Debug, Clone)]
pub struct Key {
    pub table: String,
    pub id: KeyId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyId {
    Surrogate { column: String, id: Option<i64> },
    Fields(Vec<(String, Value)>),
}

/// Keys compare by meaning: a surrogate image and a one-field composite
/// image of the same column and value are the same identity.
impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.parts() == other.parts()
    }
}

impl Eq for Key {}

impl Key {
    pub fn surrogate(table: impl Into<String>, column: impl Into<String>, id: Option<i64>) -> Self {
        Self {
            table: table.into(),
            id: KeyId::Surrogate {
                column: column.into(),
                id,
            },
        }
    }

    pub fn fields(table: impl Into<String>, fields: Vec<(String, Value)>) -> Self {
        Self {
            table: table.into(),
            id: KeyId::Fields(fields),
        }
    }

    /// True when any PK component is null (empty strings count as null).
    pub fn is_empty(&self) -> bool {
        match &self.id {
            KeyId::Surrogate { id, .. } => id.is_none(),
            KeyId::Fields(fields) => {
                fields.is_empty()
                    || fields.iter().any(|(_, v)| {
                        v.is_null() || matches!(v, Value::Str(s) if s.is_empty())
                    })
            }
        }
    }

    /// PK components as (column, value) pairs in declaration order.
    pub fn parts(&self) -> Vec<(String, Value)> {
        match &self.id {
            KeyId::Surrogate { column, id } => vec![(
                column.clone(),
                id.map(Value::LongInt).unwrap_or(Value::Null),
            )],
            KeyId::Fields(fields) => fields.clone(),
        }
    }

    /// Canonical string form, the identity-map key.
    pub fn key_str(&self) -> String {
        let mut out = String::with_capacity(80);
        out.push_str("Key('");
        out.push_str(&self.table);
        out.push_str("', {");
        match &self.id {
            KeyId::Surrogate { column, id } => {
                out.push('\'');
                out.push_str(column);
                out.push_str("': ");
                match id {
                    Some(id) => out.push_str(&id.to_string()),
                    None => out.push_str("NULL"),
                }
            }
            KeyId::Fields(fields) => {
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push('\'');
                    out.push_str(name);
                    out.push_str("': ");
                    out.push_str(&value.sql_str());
                }
            }
        }
        out.push_str("})");
        out
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_str())
    }
}

/// Table metadata: ordered columns, fast name lookup, PK image helpers.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    xml_name: String,
    class_name: String,
    seq_name: Option<String>,
    autoinc: bool,
    columns: Vec<Column>,
    name_index: HashMap<String, usize>,
    pk_fields: Vec<String>,
    depth: i32,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let xml_name = mk_xml_name(&name);
        Self {
            name,
            xml_name,
            class_name: String::new(),
            seq_name: None,
            autoinc: false,
            columns: Vec::new(),
            name_index: HashMap::new(),
            pk_fields: Vec::new(),
            depth: 0,
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_xml_name(mut self, xml_name: impl Into<String>) -> Self {
        self.xml_name = xml_name.into();
        self
    }

    pub fn with_seq_name(mut self, seq_name: impl Into<String>) -> Self {
        self.seq_name = Some(seq_name.into());
        self
    }

    pub fn with_autoinc(mut self, autoinc: bool) -> Self {
        self.autoinc = autoinc;
        self
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.add_column(column);
        self
    }

    pub fn add_column(&mut self, column: Column) {
        debug_assert!(
            !self.name_index.contains_key(column.name()),
            "duplicate column in table"
        );
        if column.is_pk() {
            self.pk_fields.push(column.name().to_string());
        }
        self.name_index
            .insert(column.name().to_string(), self.columns.len());
        self.columns.push(column);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn xml_name(&self) -> &str {
        &self.xml_name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn seq_name(&self) -> Option<&str> {
        self.seq_name.as_deref()
    }

    pub fn autoinc(&self) -> bool {
        self.autoinc
    }

    pub fn size(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_at(&self, i: usize) -> &Column {
        &self.columns[i]
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub(crate) fn set_depth(&mut self, depth: i32) {
        self.depth = depth;
    }

    pub fn pk_fields(&self) -> &[String] {
        &self.pk_fields
    }

    pub fn idx_by_name(&self, col_name: &str) -> Result<usize> {
        self.name_index
            .get(col_name)
            .copied()
            .ok_or_else(|| OrmError::ColumnNotFound {
                table: self.name.clone(),
                column: col_name.to_string(),
            })
    }

    pub fn column(&self, col_name: &str) -> Result<&Column> {
        Ok(&self.columns[self.idx_by_name(col_name)?])
    }

    /// The single-column integer PK, when the table has exactly that shape.
    pub fn find_surrogate_pk(&self) -> Option<&str> {
        if self.pk_fields.len() != 1 {
            return None;
        }
        let col = &self.columns[self.name_index[&self.pk_fields[0]]];
        match col.ty() {
            ValueType::Int | ValueType::LongInt => Some(col.name()),
            _ => None,
        }
    }

    /// Like `find_surrogate_pk`, but an absence is an error: the table is
    /// not suitable for id autogeneration.
    pub fn surrogate_pk(&self) -> Result<&str> {
        if self.pk_fields.len() > 1 {
            return Err(OrmError::AmbiguousPk(self.name.clone()));
        }
        self.find_surrogate_pk()
            .ok_or_else(|| OrmError::UnsuitablePk(self.name.clone()))
    }

    /// Build the key from a full row image in column order. The second
    /// element is false iff any PK component is null.
    pub fn mk_key(&self, values: &[Value]) -> Result<(Key, bool)> {
        if self.pk_fields.is_empty() {
            return Err(OrmError::UnsuitablePk(self.name.clone()));
        }
        if let Some(pk) = self.find_surrogate_pk() {
            let v = &values[self.name_index[pk]];
            let id = match v {
                Value::Null => None,
                other => Some(other.as_long_int()?),
            };
            let assigned = id.is_some();
            return Ok((Key::surrogate(&self.name, pk, id), assigned));
        }
        let mut fields = Vec::with_capacity(self.pk_fields.len());
        let mut assigned = true;
        for pk in &self.pk_fields {
            let v = values[self.name_index[pk]].clone();
            assigned = assigned && !v.is_null();
            fields.push((pk.clone(), v));
        }
        Ok((Key::fields(&self.name, fields), assigned))
    }

    /// Key of one row of this table by surrogate id.
    pub fn mk_key_id(&self, id: i64) -> Result<Key> {
        Ok(Key::surrogate(&self.name, self.surrogate_pk()?, Some(id)))
    }

    /// A key image with dummy non-null values, used by UPDATE/DELETE
    /// statement templates where the components become placeholders.
    pub fn mk_sample_key(&self) -> Result<Key> {
        if self.pk_fields.is_empty() {
            return Err(OrmError::UnsuitablePk(self.name.clone()));
        }
        if let Some(pk) = self.find_surrogate_pk() {
            return Ok(Key::surrogate(&self.name, pk, Some(1)));
        }
        Ok(Key::fields(
            &self.name,
            self.pk_fields
                .iter()
                .map(|pk| (pk.clone(), Value::Int(1)))
                .collect(),
        ))
    }
}

/// Relation kind as declared in the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToMany,
    ManyToMany,
    ParentChild,
}

/// What happens to slave rows when their master is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadePolicy {
    Restrict,
    Nullify,
    Delete,
}

pub type RelationAttrs = IndexMap<String, String>;

/// One declared relation between two mapped classes. Side 0 is the "one"
/// (master) side, side 1 the "many" (slave) side.
#[derive(Debug, Clone)]
pub struct Relation {
    kind: RelationKind,
    sides: [String; 2],
    attrs: [RelationAttrs; 2],
    cascade: CascadePolicy,
    tables: [String; 2],
    fk_fields: Vec<String>,
}

impl Relation {
    pub fn new(
        kind: RelationKind,
        side1: impl Into<String>,
        attrs1: RelationAttrs,
        side2: impl Into<String>,
        attrs2: RelationAttrs,
        cascade: CascadePolicy,
    ) -> Self {
        Self {
            kind,
            sides: [side1.into(), side2.into()],
            attrs: [attrs1, attrs2],
            cascade,
            tables: [String::new(), String::new()],
            fk_fields: Vec::new(),
        }
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn cascade(&self) -> CascadePolicy {
        self.cascade
    }

    pub fn side(&self, n: usize) -> &str {
        &self.sides[n]
    }

    pub fn has_attr(&self, n: usize, name: &str) -> bool {
        self.attrs[n].contains_key(name)
    }

    pub fn attr(&self, n: usize, name: &str) -> Option<&str> {
        self.attrs[n].get(name).map(String::as_str)
    }

    pub fn table_name(&self, n: usize) -> &str {
        &self.tables[n]
    }

    /// Slave-side FK column names, in master-PK order.
    pub fn fk_fields(&self) -> &[String] {
        &self.fk_fields
    }

    pub fn descr(&self) -> String {
        format!("{}-{}", self.sides[0], self.sides[1])
    }
}

/// Whole mapping: tables by name, class index, relations.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: IndexMap<String, Table>,
    classes: HashMap<String, String>,
    relations: Vec<Relation>,
    rels_by_class: HashMap<String, Vec<usize>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: Table) {
        if !table.class_name().is_empty() {
            self.classes
                .insert(table.class_name().to_string(), table.name().to_string());
        }
        self.tables.insert(table.name().to_string(), table);
    }

    pub fn size(&self) -> usize {
        self.tables.len()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| OrmError::TableNotFound(name.to_string()))
    }

    /// Position of a table in declaration order.
    pub fn table_index(&self, name: &str) -> Result<usize> {
        self.tables
            .get_index_of(name)
            .ok_or_else(|| OrmError::TableNotFound(name.to_string()))
    }

    pub fn table_at(&self, idx: usize) -> &Table {
        self.tables
            .get_index(idx)
            .map(|(_, t)| t)
            .expect("table index out of range")
    }

    pub fn table_by_class(&self, class_name: &str) -> Result<&Table> {
        let table_name = self
            .classes
            .get(class_name)
            .ok_or_else(|| OrmError::ClassNotFound(class_name.to_string()))?;
        self.table(table_name)
    }

    pub fn add_relation(&mut self, relation: Relation) {
        let idx = self.relations.len();
        for side in 0..2 {
            self.rels_by_class
                .entry(relation.side(side).to_string())
                .or_default()
                .push(idx);
        }
        self.relations.push(relation);
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation_at(&self, idx: usize) -> &Relation {
        &self.relations[idx]
    }

    /// Relation indexes where the given class participates on either side.
    pub fn relations_for_class(&self, class_name: &str) -> &[usize] {
        self.rels_by_class
            .get(class_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve relation endpoints to concrete tables and slave-side FK
    /// columns. The slave side may name its FK columns explicitly in the
    /// `key` attribute; otherwise they are discovered from the slave
    /// table's FK metadata.
    pub fn fill_fkeys(&mut self) -> Result<()> {
        let mut resolved = Vec::with_capacity(self.relations.len());
        for relation in &self.relations {
            let t1 = self.table_by_class(relation.side(0))?.name().to_string();
            let t2 = self.table_by_class(relation.side(1))?.name().to_string();
            let fk_fields = match relation.attr(1, "key") {
                Some(key) => key
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                None => {
                    let slave = self.table(&t2)?;
                    slave
                        .columns()
                        .iter()
                        .filter(|c| c.fk_table_name() == Some(t1.as_str()))
                        .map(|c| c.name().to_string())
                        .collect::<Vec<_>>()
                }
            };
            resolved.push((t1, t2, fk_fields));
        }
        for (relation, (t1, t2, fk_fields)) in self.relations.iter_mut().zip(resolved) {
            relation.tables = [t1, t2];
            relation.fk_fields = fk_fields;
        }
        Ok(())
    }

    /// Validate FK targets and assign every table its depth: 0 for tables
    /// without FK parents, otherwise one more than the deepest parent.
    /// Cycles through non-nullable FK columns are rejected; a nullable FK
    /// edge that would close a loop is skipped instead.
    pub fn check(&mut self) -> Result<()> {
        for table in self.tables.values() {
            for column in table.columns() {
                if let (Some(fk_table), fk_column) =
                    (column.fk_table_name(), column.fk_column_name())
                {
                    let target = self.tables.get(fk_table).ok_or_else(|| {
                        OrmError::IntegrityCheckFailed(format!(
                            "foreign key target table not found: {}.{} -> {}",
                            table.name(),
                            column.name(),
                            fk_table
                        ))
                    })?;
                    let fk_column = match fk_column {
                        Some(c) if !c.is_empty() => c.to_string(),
                        _ => target.surrogate_pk()?.to_string(),
                    };
                    if target.idx_by_name(&fk_column).is_err() {
                        return Err(OrmError::IntegrityCheckFailed(format!(
                            "foreign key target column not found: {}.{} -> {}.{}",
                            table.name(),
                            column.name(),
                            fk_table,
                            fk_column
                        )));
                    }
                }
            }
        }

        let names: Vec<String> = self.tables.keys().cloned().collect();
        let mut depths: HashMap<String, i32> = HashMap::new();
        let mut on_stack: HashSet<String> = HashSet::new();
        for name in &names {
            self.depth_of(name, &mut depths, &mut on_stack)?;
        }
        for (name, depth) in depths {
            if let Some(table) = self.tables.get_mut(&name) {
                table.set_depth(depth);
            }
        }
        Ok(())
    }

    fn depth_of(
        &self,
        name: &str,
        depths: &mut HashMap<String, i32>,
        on_stack: &mut HashSet<String>,
    ) -> Result<i32> {
        if let Some(d) = depths.get(name) {
            return Ok(*d);
        }
        on_stack.insert(name.to_string());
        let table = self.table(name)?;
        let mut depth = 0;
        for column in table.columns() {
            let Some(fk_table) = column.fk_table_name() else {
                continue;
            };
            if on_stack.contains(fk_table) {
                if column.is_nullable() {
                    continue;
                }
                return Err(OrmError::IntegrityCheckFailed(format!(
                    "cyclic foreign keys through {}.{}",
                    name,
                    column.name()
                )));
            }
            let parent_depth = self.depth_of(fk_table, depths, on_stack)?;
            depth = depth.max(parent_depth + 1);
        }
        on_stack.remove(name);
        depths.insert(name.to_string(), depth);
        Ok(depth)
    }

    /// Find a one-to-many relation by participant class, optional property
    /// name and optional opposite class. `prop_side` selects which side's
    /// `property` attribute the name refers to (0 = collection on the
    /// master, 1 = back reference on the slave).
    pub fn find_relation(
        &self,
        class1: &str,
        relation_name: &str,
        class2: &str,
        prop_side: usize,
    ) -> Result<&Relation> {
        let mut found = None;
        for &idx in self.relations_for_class(class1) {
            let rel = &self.relations[idx];
            if rel.kind() != RelationKind::OneToMany {
                continue;
            }
            if !class2.is_empty() && rel.side(0) != class2 && rel.side(1) != class2 {
                continue;
            }
            if !relation_name.is_empty() {
                if rel.attr(prop_side, "property") == Some(relation_name) {
                    return Ok(rel);
                }
            } else if found.is_none() {
                found = Some(rel);
            }
        }
        found.ok_or_else(|| OrmError::RelationNotFound(class1.to_string()))
    }

    /// Index of a relation by pointer identity within this schema.
    pub(crate) fn relation_index(&self, relation: &Relation) -> usize {
        self.relations
            .iter()
            .position(|r| std::ptr::eq(r, relation))
            .expect("relation belongs to this schema")
    }
}
