//! Query and mutation statements with their CQL rendering

use crate::codec::{EncodedColumn, EncodedRow, RawColumn};
use crate::config::{Config, ConsistencyLevel};
use crate::ring::{Token, TokenRange};

use super::TableSchema;

/// Quote an identifier so mixed-case and reserved names survive
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_list<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.map(quote_ident).collect::<Vec<_>>().join(", ")
}

/// Where the next page of a scan picks up
///
/// Keys are compared the way the store orders rows: by partition token,
/// then by clustering columns inside one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Resume {
    /// First page of the token range
    #[default]
    Start,
    /// Rest of one partition: rows sharing the partition key of this full
    /// primary key, with a greater clustering key
    WithinPartition(Vec<RawColumn>),
    /// Partitions whose token follows the token of this partition key,
    /// up to the end of the range
    AfterPartition(Vec<RawColumn>),
}

/// One page of a token-range scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub keyspace: String,
    pub table: String,
    /// Projected columns; `None` selects all
    pub columns: Option<Vec<String>>,
    /// Columns hashed into the token
    pub partition_key: Vec<String>,
    /// Full primary key, used for the page-by-key bound
    pub key_columns: Vec<String>,
    /// Non-wrapping range scanned by this query
    pub range: TokenRange,
    /// Exclusive lower bound taken from the last row already returned
    pub resume: Resume,
    pub limit: usize,
    pub consistency: ConsistencyLevel,
}

impl SelectQuery {
    /// First page of `range` for the table and projection named in `config`
    pub fn new(
        config: &Config,
        partition_key: Vec<String>,
        key_columns: Vec<String>,
        range: TokenRange,
    ) -> Self {
        Self {
            keyspace: config.keyspace.clone(),
            table: config.table.clone(),
            columns: config.columns.clone(),
            partition_key,
            key_columns,
            range,
            resume: Resume::Start,
            limit: config.page_size,
            consistency: config.consistency,
        }
    }

    /// Key columns after the partition key
    pub fn clustering_columns(&self) -> &[String] {
        self.key_columns
            .get(self.partition_key.len()..)
            .unwrap_or_default()
    }

    /// Render the query with `?` placeholders
    pub fn to_cql(&self) -> String {
        self.render(false)
    }

    /// Render with the token bounds written inline, for display
    pub fn to_cql_with_bounds(&self) -> String {
        self.render(true)
    }

    fn render(&self, inline_bounds: bool) -> String {
        let projection = match &self.columns {
            Some(cols) => quote_list(cols.iter().map(String::as_str)),
            None => "*".to_string(),
        };
        let token = format!(
            "token({})",
            quote_list(self.partition_key.iter().map(String::as_str))
        );
        let bound = |t: Token| {
            if inline_bounds {
                t.to_string()
            } else {
                "?".to_string()
            }
        };

        let filter = match &self.resume {
            Resume::Start => format!(
                "{} > {} AND {} <= {}",
                token,
                bound(self.range.start),
                token,
                bound(self.range.end)
            ),
            Resume::WithinPartition(_) => {
                let mut parts: Vec<String> = self
                    .partition_key
                    .iter()
                    .map(|c| format!("{} = ?", quote_ident(c)))
                    .collect();
                let clustering = self.clustering_columns();
                if !clustering.is_empty() {
                    parts.push(format!(
                        "({}) > ({})",
                        quote_list(clustering.iter().map(String::as_str)),
                        vec!["?"; clustering.len()].join(", ")
                    ));
                }
                parts.join(" AND ")
            }
            Resume::AfterPartition(_) => format!(
                "{} > token({}) AND {} <= {}",
                token,
                vec!["?"; self.partition_key.len()].join(", "),
                token,
                bound(self.range.end)
            ),
        };

        format!(
            "SELECT {} FROM {}.{} WHERE {} LIMIT {}",
            projection,
            quote_ident(&self.keyspace),
            quote_ident(&self.table),
            filter,
            self.limit
        )
    }

    /// Values bound to the placeholders, in order
    pub fn bound_values(&self) -> Vec<Option<Vec<u8>>> {
        let token_bytes = |t: Token| Some(t.0.to_be_bytes().to_vec());
        match &self.resume {
            Resume::Start => vec![token_bytes(self.range.start), token_bytes(self.range.end)],
            Resume::WithinPartition(key) => self
                .partition_key
                .iter()
                .chain(self.clustering_columns())
                .map(|name| value_of(key, name))
                .collect(),
            Resume::AfterPartition(key) => self
                .partition_key
                .iter()
                .map(|name| value_of(key, name))
                .chain(std::iter::once(token_bytes(self.range.end)))
                .collect(),
        }
    }
}

fn value_of(key: &[RawColumn], name: &str) -> Option<Vec<u8>> {
    key.iter()
        .find(|c| c.name == name)
        .and_then(|c| c.bytes.clone())
}

/// A statement the writer sends to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Insert {
        keyspace: String,
        table: String,
        row: EncodedRow,
    },
    Update {
        keyspace: String,
        table: String,
        row: EncodedRow,
    },
    CreateTable(TableSchema),
}

impl Statement {
    /// Render the statement with `?` placeholders
    pub fn to_cql(&self) -> String {
        match self {
            Statement::Insert {
                keyspace,
                table,
                row,
            } => format!(
                "INSERT INTO {}.{} ({}) VALUES ({})",
                quote_ident(keyspace),
                quote_ident(table),
                quote_list(row.columns.iter().map(|c| c.name.as_str())),
                vec!["?"; row.len()].join(", ")
            ),
            Statement::Update {
                keyspace,
                table,
                row,
            } => {
                let set = row
                    .regular_columns()
                    .map(|c| format!("{} = ?", quote_ident(&c.name)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let filter = row
                    .key_columns()
                    .map(|c| format!("{} = ?", quote_ident(&c.name)))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                format!(
                    "UPDATE {}.{} SET {} WHERE {}",
                    quote_ident(keyspace),
                    quote_ident(table),
                    set,
                    filter
                )
            }
            Statement::CreateTable(schema) => {
                let columns = schema
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", quote_ident(&c.name), c.type_tag))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut key = format!(
                    "({})",
                    quote_list(schema.partition_key().into_iter())
                );
                let clustering = schema.clustering_key();
                if !clustering.is_empty() {
                    key.push_str(", ");
                    key.push_str(&quote_list(clustering.into_iter()));
                }
                format!(
                    "CREATE TABLE IF NOT EXISTS {}.{} ({}, PRIMARY KEY ({}))",
                    quote_ident(&schema.keyspace),
                    quote_ident(&schema.table),
                    columns,
                    key
                )
            }
        }
    }

    /// Values bound to the placeholders, in order
    pub fn bound_values(&self) -> Vec<Option<Vec<u8>>> {
        let bytes = |c: &EncodedColumn| c.bytes.clone();
        match self {
            Statement::Insert { row, .. } => row.columns.iter().map(bytes).collect(),
            Statement::Update { row, .. } => row
                .regular_columns()
                .chain(row.key_columns())
                .map(bytes)
                .collect(),
            Statement::CreateTable(_) => Vec::new(),
        }
    }

    /// Encoded row carried by a mutation
    pub fn row(&self) -> Option<&EncodedRow> {
        match self {
            Statement::Insert { row, .. } | Statement::Update { row, .. } => Some(row),
            Statement::CreateTable(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KeyKind, TypeTag};
    use crate::store::ColumnDef;

    fn column(name: &str, tag: TypeTag, kind: KeyKind) -> EncodedColumn {
        EncodedColumn {
            name: name.into(),
            type_tag: tag,
            key_kind: kind,
            bytes: Some(vec![1]),
        }
    }

    fn select(key_columns: &[&str]) -> SelectQuery {
        SelectQuery {
            keyspace: "test".into(),
            table: "tweets".into(),
            columns: Some(vec!["id".into(), "author".into()]),
            partition_key: vec!["id".into()],
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
            range: TokenRange::new(Token(-5), Token(5)),
            resume: Resume::Start,
            limit: 100,
            consistency: ConsistencyLevel::One,
        }
    }

    fn key(name: &str, v: u8) -> RawColumn {
        RawColumn::new(name, "int", Some(vec![0, 0, 0, v]))
    }

    #[test]
    fn test_select_cql() {
        let mut query = select(&["id"]);
        assert_eq!(
            query.to_cql(),
            r#"SELECT "id", "author" FROM "test"."tweets" WHERE token("id") > ? AND token("id") <= ? LIMIT 100"#
        );
        assert_eq!(query.bound_values().len(), 2);
        assert!(query
            .to_cql_with_bounds()
            .contains(r#"token("id") > -5 AND token("id") <= 5"#));

        query.resume = Resume::AfterPartition(vec![key("id", 1)]);
        assert_eq!(
            query.to_cql(),
            r#"SELECT "id", "author" FROM "test"."tweets" WHERE token("id") > token(?) AND token("id") <= ? LIMIT 100"#
        );
        assert_eq!(
            query.bound_values(),
            vec![Some(vec![0, 0, 0, 1]), Some(5i64.to_be_bytes().to_vec())]
        );
        assert!(query
            .to_cql_with_bounds()
            .contains(r#"token("id") > token(?) AND token("id") <= 5"#));
    }

    #[test]
    fn test_select_cql_within_partition() {
        let mut query = select(&["id", "day", "seq"]);
        assert_eq!(query.clustering_columns(), ["day".to_string(), "seq".to_string()]);
        query.resume = Resume::WithinPartition(vec![key("id", 1), key("day", 2), key("seq", 3)]);
        assert_eq!(
            query.to_cql(),
            r#"SELECT "id", "author" FROM "test"."tweets" WHERE "id" = ? AND ("day", "seq") > (?, ?) LIMIT 100"#
        );
        assert_eq!(
            query.bound_values(),
            vec![Some(vec![0, 0, 0, 1]), Some(vec![0, 0, 0, 2]), Some(vec![0, 0, 0, 3])]
        );
        assert!(!query.to_cql().contains("token("));
    }

    #[test]
    fn test_update_cql_orders_values() {
        let row = EncodedRow::new(vec![
            column("id", TypeTag::Int, KeyKind::PartitionKey),
            column("name", TypeTag::Text, KeyKind::Regular),
        ]);
        let statement = Statement::Update {
            keyspace: "ks".into(),
            table: "t".into(),
            row,
        };
        assert_eq!(
            statement.to_cql(),
            r#"UPDATE "ks"."t" SET "name" = ? WHERE "id" = ?"#
        );
    }

    #[test]
    fn test_create_table_cql() {
        let schema = TableSchema::new(
            "out",
            "cells",
            vec![
                ColumnDef::new("id", TypeTag::Int, KeyKind::PartitionKey),
                ColumnDef::new("day", TypeTag::Text, KeyKind::ClusteringKey),
                ColumnDef::new("uuid2id", TypeTag::map(TypeTag::Uuid, TypeTag::Int), KeyKind::Regular),
            ],
        );
        assert_eq!(
            Statement::CreateTable(schema).to_cql(),
            r#"CREATE TABLE IF NOT EXISTS "out"."cells" ("id" int, "day" text, "uuid2id" map<uuid, int>, PRIMARY KEY (("id"), "day"))"#
        );
    }
}
