//! Static table descriptors for the SQLite world store and the DDL generated from them

/// Column data type
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Integer,
    Text,
    Boolean,
    /// JSON object stored as text
    Json,
}

/// Column definition
#[derive(Debug, Clone)]
pub struct Column {
    pub name: &'static str,
    pub col_type: ColumnType,
    pub nullable: bool,
    /// SQL literal used as DEFAULT
    pub default: Option<&'static str>,
}

impl Column {
    /// Create an optional (nullable) column
    pub const fn new(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            nullable: true,
            default: None,
        }
    }

    /// Create a required (non-nullable) column
    pub const fn required(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            nullable: false,
            default: None,
        }
    }

    pub const fn default_to(self, literal: &'static str) -> Self {
        Self {
            default: Some(literal),
            ..self
        }
    }
}

/// Foreign key reference
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references_table: &'static str,
    pub references_column: &'static str,
}

impl ForeignKey {
    pub const fn new(column: &'static str, references_table: &'static str) -> Self {
        Self {
            column,
            references_table,
            references_column: "id",
        }
    }
}

/// Index definition
#[derive(Debug, Clone)]
pub struct Index {
    pub columns: &'static [&'static str],
    pub unique: bool,
}

impl Index {
    pub const fn on(columns: &'static [&'static str]) -> Self {
        Self {
            columns,
            unique: false,
        }
    }

    pub const fn unique(columns: &'static [&'static str]) -> Self {
        Self {
            columns,
            unique: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: &'static str,
    /// Import file inside a world directory
    pub source_file: &'static str,
    pub columns: &'static [Column],
    pub primary_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
    pub indexes: &'static [Index],
}

pub static SYSTEMS: TableSchema = TableSchema {
    name: "systems",
    source_file: "systems.jsonl",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("name", ColumnType::Text),
        Column::required("metadata", ColumnType::Json).default_to("'{}'"),
    ],
    primary_key: &["id"],
    foreign_keys: &[],
    indexes: &[],
};

// Several wormholes in one system are storable; the engine reports them.
pub static SECTORS: TableSchema = TableSchema {
    name: "sectors",
    source_file: "sectors.jsonl",
    columns: &[
        Column::required("id", ColumnType::Integer),
        Column::required("system_id", ColumnType::Integer),
        Column::required("sector_number", ColumnType::Integer),
        Column::required("sector_type", ColumnType::Text).default_to("'ordinary'"),
    ],
    primary_key: &["id"],
    foreign_keys: &[ForeignKey::new("system_id", "systems")],
    indexes: &[
        Index::unique(&["system_id", "sector_number"]),
        Index::on(&["sector_type"]),
    ],
};

pub static SYSTEM_CONNECTIONS: TableSchema = TableSchema {
    name: "system_connections",
    source_file: "system_connections.jsonl",
    columns: &[
        Column::required("system_id", ColumnType::Integer),
        Column::required("connected_system_id", ColumnType::Integer),
    ],
    primary_key: &["system_id", "connected_system_id"],
    foreign_keys: &[
        ForeignKey::new("system_id", "systems"),
        ForeignKey::new("connected_system_id", "systems"),
    ],
    indexes: &[],
};

pub static PILOTS: TableSchema = TableSchema {
    name: "pilots",
    source_file: "pilots.jsonl",
    columns: &[
        Column::required("username", ColumnType::Text),
        Column::required("current_sector_id", ColumnType::Integer),
        Column::required("turns", ColumnType::Integer).default_to("0"),
        Column::required("is_admin", ColumnType::Boolean).default_to("0"),
        Column::required("pilot_level", ColumnType::Integer).default_to("1"),
        Column::required("version", ColumnType::Integer).default_to("0"),
    ],
    primary_key: &["username"],
    foreign_keys: &[ForeignKey::new("current_sector_id", "sectors")],
    indexes: &[],
};

/// All tables, parents before children
pub static ALL_TABLES: &[&TableSchema] = &[&SYSTEMS, &SECTORS, &SYSTEM_CONNECTIONS, &PILOTS];

/// Generate CREATE TABLE SQL for a table schema
pub fn generate_create_table(schema: &TableSchema) -> String {
    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", schema.name);
    let mut columns = Vec::new();

    for col in schema.columns {
        let sql_type = match col.col_type {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "INTEGER",
            ColumnType::Json => "TEXT",
        };

        let null_constraint = if !col.nullable { " NOT NULL" } else { "" };
        let default = col
            .default
            .map(|literal| format!(" DEFAULT {}", literal))
            .unwrap_or_default();

        columns.push(format!(
            "    {} {}{}{}",
            col.name, sql_type, null_constraint, default
        ));
    }

    if !schema.primary_key.is_empty() {
        columns.push(format!("    PRIMARY KEY ({})", schema.primary_key.join(", ")));
    }

    for fk in schema.foreign_keys {
        columns.push(format!(
            "    FOREIGN KEY ({}) REFERENCES {}({})",
            fk.column, fk.references_table, fk.references_column
        ));
    }

    sql.push_str(&columns.join(",\n"));
    sql.push_str("\n)");

    sql
}

/// Generate CREATE INDEX statements for explicit indexes and foreign key columns
pub fn generate_indexes(schema: &TableSchema) -> Vec<String> {
    let explicit = schema.indexes.iter().map(|index| {
        format!(
            "CREATE {}INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
            if index.unique { "UNIQUE " } else { "" },
            schema.name,
            index.columns.join("_"),
            schema.name,
            index.columns.join(", ")
        )
    });

    // The leading primary key column is already indexed
    let foreign = schema
        .foreign_keys
        .iter()
        .filter(|fk| schema.primary_key.first() != Some(&fk.column))
        .map(|fk| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
                schema.name, fk.column, schema.name, fk.column
            )
        });

    explicit.chain(foreign).collect()
}
