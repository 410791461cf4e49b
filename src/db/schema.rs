//! Reflected schema of the meal database.
//!
//! The SQL tools hand this to the model as `CREATE TABLE` statements, so the
//! model sees the same shape SQLite itself would report.

/// Tables and foreign keys reflected from SQLite.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub tables: Vec<Table>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Renders `name` as a `CREATE TABLE` statement, or `None` if unknown.
    ///
    /// Columns keep their declared order; the primary key and outgoing
    /// foreign keys follow as table constraints.
    pub fn table_ddl(&self, name: &str) -> Option<String> {
        let table = self.table(name)?;

        let mut lines: Vec<String> = table.columns.iter().map(Column::ddl).collect();
        if !table.primary_key.is_empty() {
            lines.push(format!("PRIMARY KEY ({})", table.primary_key.join(", ")));
        }
        lines.extend(
            self.foreign_keys
                .iter()
                .filter(|fk| fk.from_table == table.name)
                .map(|fk| {
                    format!(
                        "FOREIGN KEY({}) REFERENCES {} ({})",
                        fk.from_columns.join(", "),
                        fk.to_table,
                        fk.to_columns.join(", ")
                    )
                }),
        );

        Some(format!(
            "CREATE TABLE {} (\n\t{}\n)",
            table.name,
            lines.join(", \n\t")
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    /// Primary key columns in key order.
    pub primary_key: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Column {
    pub name: String,
    /// Declared type as written in the table definition (may be empty).
    pub data_type: String,
    pub is_nullable: bool,
    /// Default expression, verbatim.
    pub default: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.is_nullable = nullable;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn ddl(&self) -> String {
        let mut out = self.name.clone();
        if !self.data_type.is_empty() {
            out.push(' ');
            out.push_str(&self.data_type);
        }
        if !self.is_nullable {
            out.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            out.push_str(" DEFAULT ");
            out.push_str(default);
        }
        out
    }
}

/// `from_table(from_columns) -> to_table(to_columns)`.
#[derive(Debug, Clone, Default)]
pub struct ForeignKey {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(
        from_table: impl Into<String>,
        from_columns: Vec<String>,
        to_table: impl Into<String>,
        to_columns: Vec<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_columns,
            to_table: to_table.into(),
            to_columns,
        }
    }
}
