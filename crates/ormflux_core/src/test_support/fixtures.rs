use crate::{
    CascadePolicy, Column, ColumnFlags, Relation, RelationAttrs, RelationKind, Row, Schema, Table,
    Value, ValueType,
};

/// One fetched row from (column, value) pairs.
pub fn row(cells: Vec<(&str, Value)>) -> Row {
    cells
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// The canonical master/detail pair used across the core's tests:
/// `T_CLIENT` (surrogate PK, sequence + autoincrement hints) with a
/// one-to-many relation onto `T_ORDER` through the nullable FK
/// `CLIENT_ID`.
pub fn client_order_schema_with_cascade(cascade: CascadePolicy) -> Schema {
    let mut schema = Schema::new();
    schema.add_table(
        Table::new("T_CLIENT")
            .with_class("Client")
            .with_seq_name("S_CLIENT_ID")
            .with_autoinc(true)
            .with_column(Column::new("ID", ValueType::LongInt, 0, ColumnFlags::PRIMARY_KEY))
            .with_column(Column::new("NAME", ValueType::Str, 100, ColumnFlags::empty()))
            .with_column(Column::new(
                "BALANCE",
                ValueType::Decimal,
                0,
                ColumnFlags::NULLABLE,
            )),
    );
    schema.add_table(
        Table::new("T_ORDER")
            .with_class("Order")
            .with_seq_name("S_ORDER_ID")
            .with_autoinc(true)
            .with_column(Column::new("ID", ValueType::LongInt, 0, ColumnFlags::PRIMARY_KEY))
            .with_column(
                Column::new("CLIENT_ID", ValueType::LongInt, 0, ColumnFlags::NULLABLE)
                    .with_fk("T_CLIENT", "ID"),
            )
            .with_column(Column::new(
                "AMOUNT",
                ValueType::Decimal,
                0,
                ColumnFlags::NULLABLE,
            )),
    );
    let mut attrs1 = RelationAttrs::new();
    attrs1.insert("property".into(), "orders".into());
    let mut attrs2 = RelationAttrs::new();
    attrs2.insert("property".into(), "owner".into());
    schema.add_relation(Relation::new(
        RelationKind::OneToMany,
        "Client",
        attrs1,
        "Order",
        attrs2,
        cascade,
    ));
    schema.fill_fkeys().expect("fixture relations resolve");
    schema.check().expect("fixture schema is consistent");
    schema
}

/// `client_order_schema_with_cascade` with the delete policy the bulk of
/// the tests want.
pub fn client_order_schema() -> Schema {
    client_order_schema_with_cascade(CascadePolicy::Delete)
}
