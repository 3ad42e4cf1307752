//! Fixture models shared by the unit tests of this crate.

use eav_rs_core::EavResult;
use once_cell::sync::Lazy;

use crate::apps::GenericRelation;
use crate::connection::Database;
use crate::contenttypes::ContentType;
use crate::fields::{FieldDef, FieldType, OnDelete};
use crate::model::{Model, ModelMeta, Slots};
use crate::query::compiler::OrderBy;
use crate::row::FromValue;
use crate::value::Value;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Author {
    pub id: Option<i64>,
    pub name: String,
    pub age: Option<i64>,
    pub data: Option<serde_json::Value>,
    pub slots: Slots,
}

impl Model for Author {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| ModelMeta {
            app_label: "library",
            model_name: "author",
            db_table: "library_author".to_string(),
            verbose_name: "author".to_string(),
            ordering: vec![OrderBy::asc("name")],
            fields: vec![
                FieldDef::new("id", FieldType::AutoField).primary_key(),
                FieldDef::new("name", FieldType::CharField).max_length(40),
                FieldDef::new("age", FieldType::IntegerField).nullable(),
                FieldDef::new("data", FieldType::JsonField).nullable(),
            ],
            constraints: vec![],
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn set_pk(&mut self, value: Value) {
        self.id = value.as_int();
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("name", Value::from(self.name.as_str())),
            ("age", Value::from(self.age)),
            ("data", Value::from(self.data.clone())),
        ]
    }

    fn set_field(&mut self, column: &str, value: &Value) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
            "age" => self.age = FromValue::from_value(value)?,
            "data" => self.data = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn slots(&self) -> Option<&Slots> {
        Some(&self.slots)
    }

    fn slots_mut(&mut self) -> Option<&mut Slots> {
        Some(&mut self.slots)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Book {
    pub id: Option<i64>,
    pub title: String,
    pub pages: i64,
    pub author_id: Option<i64>,
}

impl Model for Book {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| ModelMeta {
            app_label: "library",
            model_name: "book",
            db_table: "library_book".to_string(),
            verbose_name: "book".to_string(),
            ordering: vec![],
            fields: vec![
                FieldDef::new("id", FieldType::AutoField).primary_key(),
                FieldDef::new("title", FieldType::CharField).max_length(80),
                FieldDef::new("pages", FieldType::IntegerField).default(0),
                FieldDef::foreign_key("author", Author::key(), OnDelete::Cascade)
                    .nullable()
                    .related_name("books"),
            ],
            constraints: vec![],
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn set_pk(&mut self, value: Value) {
        self.id = value.as_int();
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("title", Value::from(self.title.as_str())),
            ("pages", Value::Int(self.pages)),
            ("author_id", Value::from(self.author_id)),
        ]
    }

    fn set_field(&mut self, column: &str, value: &Value) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "title" => self.title = FromValue::from_value(value)?,
            "pages" => self.pages = FromValue::from_value(value)?,
            "author_id" => self.author_id = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

/// Rows attached to any model through `(content_type_id, object_id)`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tag {
    pub id: Option<i64>,
    pub label: String,
    pub content_type_id: Option<i64>,
    pub object_id: Option<i64>,
}

impl Model for Tag {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| ModelMeta {
            app_label: "library",
            model_name: "tag",
            db_table: "library_tag".to_string(),
            verbose_name: "tag".to_string(),
            ordering: vec![],
            fields: vec![
                FieldDef::new("id", FieldType::AutoField).primary_key(),
                FieldDef::new("label", FieldType::CharField).max_length(20),
                FieldDef::foreign_key("content_type", ContentType::key(), OnDelete::Cascade)
                    .nullable(),
                FieldDef::new("object_id", FieldType::IntegerField).nullable(),
            ],
            constraints: vec![],
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Int)
    }

    fn set_pk(&mut self, value: Value) {
        self.id = value.as_int();
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("label", Value::from(self.label.as_str())),
            ("content_type_id", Value::from(self.content_type_id)),
            ("object_id", Value::from(self.object_id)),
        ]
    }

    fn set_field(&mut self, column: &str, value: &Value) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "label" => self.label = FromValue::from_value(value)?,
            "content_type_id" => self.content_type_id = FromValue::from_value(value)?,
            "object_id" => self.object_id = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

/// A fresh in-memory database with the library tables and an `Author.tags`
/// generic relation.
pub fn test_db() -> Database {
    let db = Database::memory().expect("in-memory database");
    db.create_table::<Author>().expect("author table");
    db.create_table::<Book>().expect("book table");
    db.create_table::<Tag>().expect("tag table");
    let ct = ContentType::get_for_model::<Author>(&db).expect("author content type");
    db.apps()
        .add_generic_relation(
            Author::key(),
            GenericRelation {
                name: "tags".to_string(),
                related: Tag::key(),
                content_type_column: "content_type_id".to_string(),
                object_id_column: "object_id".to_string(),
                content_type_id: ct.id_or_zero(),
                related_query_name: Some("author".to_string()),
            },
        )
        .expect("tags relation");
    db
}

/// Inserts an author row and returns its id.
pub fn add_author(db: &Database, name: &str, age: Option<i64>) -> i64 {
    db.insert_returning_id(
        "INSERT INTO library_author (name, age) VALUES (?, ?)",
        &[Value::from(name), Value::from(age)],
    )
    .expect("insert author")
}

/// Inserts a book row and returns its id.
pub fn add_book(db: &Database, title: &str, author: Option<i64>) -> i64 {
    db.insert_returning_id(
        "INSERT INTO library_book (title, pages, author_id) VALUES (?, 100, ?)",
        &[Value::from(title), Value::from(author)],
    )
    .expect("insert book")
}

/// Tags an author.
pub fn add_tag(db: &Database, label: &str, author: i64) {
    let ct = ContentType::get_for_model::<Author>(db).expect("author content type");
    db.execute(
        "INSERT INTO library_tag (label, content_type_id, object_id) VALUES (?, ?, ?)",
        &[Value::from(label), Value::from(ct.id), Value::Int(author)],
    )
    .expect("insert tag");
}
