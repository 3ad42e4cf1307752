//! Value rows: one datum of one attribute for one entity.
//!
//! The owning entity is identified by its content type plus exactly one of
//! an integer or a UUID key. [`EntityKey`] is the in-memory form of that
//! pair of columns; a CHECK constraint keeps the table in the same shape.
//! Of the typed columns only the one matching the attribute's datatype is
//! populated; [`ValueColumns`] converts between them and [`AttrValue`].

use std::fmt;

use chrono::{NaiveDateTime, SubsecRound};
use eav_rs_core::{EavError, EavResult, ValidationError};
use eav_rs_db::constraints::{CheckConstraint, UniqueConstraint};
use eav_rs_db::query::Lookup;
use eav_rs_db::{
    save_model, ContentType, Database, FieldDef, FieldType, FromValue, Model, ModelMeta,
    OnDelete, QuerySet, Value as DbValue, Q,
};
use once_cell::sync::Lazy;
use uuid::Uuid;

use super::{now, Attribute, EnumValue, APP_LABEL};
use crate::attr_value::{AttrValue, ObjectRef};
use crate::datatype::Datatype;
use crate::validators;

// ── Entity identity ────────────────────────────────────────────────────

/// The primary key of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    /// An integer key, stored in `entity_id`.
    Int(i64),
    /// A UUID key, stored in `entity_uuid`.
    Uuid(Uuid),
}

impl EntityKey {
    /// Converts a primary key value. Returns `None` for null or unsupported
    /// key types.
    pub fn from_pk(pk: &DbValue) -> Option<Self> {
        match pk {
            DbValue::Int(id) => Some(Self::Int(*id)),
            DbValue::Uuid(uuid) => Some(Self::Uuid(*uuid)),
            DbValue::String(s) => Uuid::parse_str(s).ok().map(Self::Uuid),
            _ => None,
        }
    }

    /// Returns the value-table column holding this kind of key.
    pub const fn column(&self) -> &'static str {
        match self {
            Self::Int(_) => "entity_id",
            Self::Uuid(_) => "entity_uuid",
        }
    }

    /// Returns the key as a query value.
    pub const fn to_db(&self) -> DbValue {
        match self {
            Self::Int(id) => DbValue::Int(*id),
            Self::Uuid(uuid) => DbValue::Uuid(*uuid),
        }
    }
}

impl Default for EntityKey {
    fn default() -> Self {
        Self::Int(0)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Uuid(uuid) => write!(f, "{uuid}"),
        }
    }
}

/// Returns the value-table column for entities of a model with this meta.
pub fn entity_column(meta: &ModelMeta) -> &'static str {
    if meta.has_uuid_pk() {
        "entity_uuid"
    } else {
        "entity_id"
    }
}

/// A saved entity: its content type and key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub content_type_id: i64,
    pub key: EntityKey,
}

impl EntityRef {
    /// Builds the reference of a saved instance; `None` while it is unsaved.
    ///
    /// # Errors
    ///
    /// Propagates content type errors.
    pub fn of<M: Model>(db: &Database, instance: &M) -> EavResult<Option<Self>> {
        let Some(key) = instance.pk().as_ref().and_then(EntityKey::from_pk) else {
            return Ok(None);
        };
        let content_type = ContentType::get_for_model::<M>(db)?;
        Ok(Some(Self {
            content_type_id: content_type.id_or_zero(),
            key,
        }))
    }

    /// The filter selecting this entity's value rows.
    pub fn filter(&self) -> Q {
        Q::exact("entity_ct", self.content_type_id) & Q::exact(self.key.column(), self.key.to_db())
    }
}

// ── Typed columns ──────────────────────────────────────────────────────

/// The typed value columns of one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueColumns {
    pub text: Option<String>,
    pub float: Option<f64>,
    pub int: Option<i64>,
    pub date: Option<NaiveDateTime>,
    pub bool: Option<bool>,
    pub enum_id: Option<i64>,
    pub json: Option<serde_json::Value>,
    pub csv: Option<String>,
    pub generic_value_id: Option<i64>,
    pub generic_value_ct_id: Option<i64>,
}

impl ValueColumns {
    /// Fills the column of `datatype` from a canonical value (see
    /// [`AttrValue::coerce`]). Lists are joined with `separator`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the value does not have the
    /// datatype's shape, or is an unsaved enum choice or object.
    pub fn from_attr(datatype: Datatype, value: &AttrValue, separator: &str) -> EavResult<Self> {
        let mut columns = Self::default();
        match (datatype, value) {
            (_, AttrValue::Null) => {}
            (Datatype::Text, AttrValue::Text(s)) => columns.text = Some(s.clone()),
            (Datatype::Float, AttrValue::Float(f)) => columns.float = Some(*f),
            (Datatype::Int, AttrValue::Int(i)) => columns.int = Some(*i),
            (Datatype::Date, AttrValue::Date(d)) => columns.date = Some(d.trunc_subsecs(6)),
            (Datatype::Bool, AttrValue::Bool(b)) => columns.bool = Some(*b),
            (Datatype::Enum, AttrValue::Enum(choice)) => columns.enum_id = Some(choice.saved_id()?),
            (Datatype::Json, AttrValue::Json(json)) => columns.json = Some(json.clone()),
            (Datatype::Csv, AttrValue::Csv(items)) => {
                validators::validate_csv_items(items, separator)?;
                columns.csv = Some(items.join(separator));
            }
            (Datatype::Object, AttrValue::Object(object)) => {
                let pk = object.pk.ok_or_else(|| {
                    ValidationError::new("Model has to be saved first", "unsaved_object")
                })?;
                columns.generic_value_id = Some(pk);
                columns.generic_value_ct_id = Some(object.content_type_id);
            }
            (datatype, other) => {
                return Err(ValidationError::new(
                    format!("{other:?} cannot be stored as {datatype}"),
                    "invalid",
                )
                .into());
            }
        }
        Ok(columns)
    }

    /// Reads the column of `datatype` back into a value.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced enum choice no longer exists.
    pub fn to_attr(&self, db: &Database, datatype: Datatype, separator: &str) -> EavResult<AttrValue> {
        Ok(match datatype {
            Datatype::Text => self.text.clone().into(),
            Datatype::Float => self.float.into(),
            Datatype::Int => self.int.into(),
            Datatype::Date => self.date.into(),
            Datatype::Bool => self.bool.into(),
            Datatype::Json => self.json.clone().into(),
            Datatype::Enum => match self.enum_id {
                Some(id) => EnumValue::get_by_id(db, id)?.into(),
                None => AttrValue::Null,
            },
            Datatype::Csv => match &self.csv {
                Some(s) if s.is_empty() => AttrValue::Csv(Vec::new()),
                Some(s) => AttrValue::Csv(s.split(separator).map(str::to_string).collect()),
                None => AttrValue::Null,
            },
            Datatype::Object => match (self.generic_value_ct_id, self.generic_value_id) {
                (Some(content_type_id), Some(pk)) => AttrValue::Object(ObjectRef {
                    content_type_id,
                    pk: Some(pk),
                }),
                _ => AttrValue::Null,
            },
        })
    }

    /// Compares only the column `datatype` stores its values in.
    pub fn matches(&self, other: &Self, datatype: Datatype) -> bool {
        match datatype {
            Datatype::Text => self.text == other.text,
            Datatype::Float => self.float == other.float,
            Datatype::Int => self.int == other.int,
            Datatype::Date => self.date == other.date,
            Datatype::Bool => self.bool == other.bool,
            Datatype::Enum => self.enum_id == other.enum_id,
            Datatype::Json => self.json == other.json,
            Datatype::Csv => self.csv == other.csv,
            Datatype::Object => {
                self.generic_value_id == other.generic_value_id
                    && self.generic_value_ct_id == other.generic_value_ct_id
            }
        }
    }
}

// ── The model ──────────────────────────────────────────────────────────

/// One persisted attribute value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Value {
    pub id: Option<i64>,
    pub attribute_id: i64,
    pub entity_ct_id: i64,
    pub entity: EntityKey,
    pub columns: ValueColumns,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
}

impl Value {
    /// Creates an unsaved row.
    pub fn new(attribute_id: i64, entity: EntityRef, columns: ValueColumns) -> Self {
        Self {
            id: None,
            attribute_id,
            entity_ct_id: entity.content_type_id,
            entity: entity.key,
            columns,
            created: NaiveDateTime::default(),
            modified: NaiveDateTime::default(),
        }
    }

    /// Returns a query set over every row.
    pub fn objects() -> QuerySet<Self> {
        QuerySet::new()
    }

    /// Returns a query set over one entity's rows.
    pub fn for_entity(entity: &EntityRef) -> QuerySet<Self> {
        Self::objects().filter(entity.filter())
    }

    /// Returns the owning entity.
    pub const fn entity_ref(&self) -> EntityRef {
        EntityRef {
            content_type_id: self.entity_ct_id,
            key: self.entity,
        }
    }

    /// Checks that an enum choice belongs to the attribute's group, then
    /// saves the row, maintaining its timestamps.
    ///
    /// # Errors
    ///
    /// Returns validation errors and integrity errors from the unique
    /// constraints.
    pub fn save(&mut self, db: &Database) -> EavResult<()> {
        if let Some(enum_id) = self.columns.enum_id {
            let attribute = self.attribute(db)?;
            let choice = EnumValue::get_by_id(db, enum_id)?;
            let member = match attribute.get_enum_group(db)? {
                Some(group) => group.contains(db, &choice)?,
                None => false,
            };
            if !member {
                return Err(ValidationError::field(
                    attribute.slug.clone(),
                    ValidationError::new(
                        format!("{choice} is not a valid choice for {}", attribute.name),
                        "invalid_choice",
                    ),
                )
                .into());
            }
        }
        let stamp = now();
        if self.id.is_none() {
            self.created = stamp;
        }
        self.modified = stamp;
        save_model(db, self)?;
        Ok(())
    }

    /// Loads the attribute this row belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] if it is gone.
    pub fn attribute(&self, db: &Database) -> EavResult<Attribute> {
        Attribute::get_by_id(db, self.attribute_id)
    }

    /// Returns the stored value, typed by the attribute's datatype.
    ///
    /// # Errors
    ///
    /// Propagates lookup errors.
    pub fn value(&self, db: &Database) -> EavResult<AttrValue> {
        let attribute = self.attribute(db)?;
        self.columns
            .to_attr(db, attribute.datatype, &db.settings().csv_separator)
    }

    /// Renders `name: "value" (entity)`.
    ///
    /// # Errors
    ///
    /// Propagates lookup errors.
    pub fn describe(&self, db: &Database) -> EavResult<String> {
        let attribute = self.attribute(db)?;
        let value = self
            .columns
            .to_attr(db, attribute.datatype, &db.settings().csv_separator)?;
        let content_type = ContentType::get_for_id(db, self.entity_ct_id)?;
        Ok(format!(
            "{}: \"{value}\" ({}.{} {})",
            attribute.name, content_type.app_label, content_type.model, self.entity
        ))
    }

    /// Returns the natural key: the attribute's natural key and the entity.
    ///
    /// # Errors
    ///
    /// Propagates lookup errors.
    pub fn natural_key(&self, db: &Database) -> EavResult<((String, String), EntityRef)> {
        Ok((self.attribute(db)?.natural_key(), self.entity_ref()))
    }

    /// Fetches the row of an attribute (by its natural key) for an entity.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] if either is missing.
    pub fn get_by_natural_key(
        db: &Database,
        attribute: (&str, &str),
        entity: &EntityRef,
    ) -> EavResult<Self> {
        let attribute = Attribute::get_by_natural_key(db, attribute.0, attribute.1)?;
        Self::for_entity(entity)
            .filter(Q::exact("attribute", attribute.id))
            .get_exec(db)
    }
}

impl Model for Value {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| {
            let int_entity = Q::filter("entity_id", Lookup::IsNull(false))
                & Q::filter("entity_uuid", Lookup::IsNull(true));
            let uuid_entity = Q::filter("entity_id", Lookup::IsNull(true))
                & Q::filter("entity_uuid", Lookup::IsNull(false));
            ModelMeta {
                app_label: APP_LABEL,
                model_name: "value",
                db_table: "eav_value".to_string(),
                verbose_name: "value".to_string(),
                ordering: vec![],
                fields: vec![
                    FieldDef::new("id", FieldType::AutoField).primary_key(),
                    FieldDef::foreign_key("entity_ct", ContentType::key(), OnDelete::Cascade)
                        .related_name("value_entities"),
                    FieldDef::new("entity_id", FieldType::IntegerField).nullable(),
                    FieldDef::new("entity_uuid", FieldType::UuidField).nullable(),
                    FieldDef::new("value_text", FieldType::TextField).nullable(),
                    FieldDef::new("value_float", FieldType::FloatField).nullable(),
                    FieldDef::new("value_int", FieldType::IntegerField).nullable(),
                    FieldDef::new("value_date", FieldType::DateTimeField).nullable(),
                    FieldDef::new("value_bool", FieldType::BooleanField).nullable(),
                    FieldDef::foreign_key("value_enum", EnumValue::key(), OnDelete::Protect)
                        .nullable()
                        .related_name("eav_values"),
                    FieldDef::new("value_json", FieldType::JsonField).nullable(),
                    FieldDef::new("value_csv", FieldType::TextField).nullable(),
                    FieldDef::new("generic_value_id", FieldType::IntegerField).nullable(),
                    FieldDef::foreign_key("generic_value_ct", ContentType::key(), OnDelete::Protect)
                        .nullable()
                        .related_name("value_values"),
                    FieldDef::new("created", FieldType::DateTimeField),
                    FieldDef::new("modified", FieldType::DateTimeField),
                    FieldDef::foreign_key("attribute", Attribute::key(), OnDelete::Protect),
                ],
                constraints: vec![
                    Box::new(CheckConstraint::new(
                        "eav_value_one_entity_key",
                        int_entity | uuid_entity,
                    )),
                    Box::new(UniqueConstraint::new(
                        "eav_value_unique_entity_id",
                        &["entity_ct_id", "attribute_id", "entity_id"],
                    )),
                    Box::new(UniqueConstraint::new(
                        "eav_value_unique_entity_uuid",
                        &["entity_ct_id", "attribute_id", "entity_uuid"],
                    )),
                ],
            }
        });
        &META
    }

    fn pk(&self) -> Option<DbValue> {
        self.id.map(DbValue::Int)
    }

    fn set_pk(&mut self, value: DbValue) {
        self.id = value.as_int();
    }

    fn field_values(&self) -> Vec<(&'static str, DbValue)> {
        let (entity_id, entity_uuid) = match self.entity {
            EntityKey::Int(id) => (DbValue::Int(id), DbValue::Null),
            EntityKey::Uuid(uuid) => (DbValue::Null, DbValue::Uuid(uuid)),
        };
        let c = &self.columns;
        vec![
            ("id", DbValue::from(self.id)),
            ("entity_ct_id", DbValue::Int(self.entity_ct_id)),
            ("entity_id", entity_id),
            ("entity_uuid", entity_uuid),
            ("value_text", DbValue::from(c.text.clone())),
            ("value_float", DbValue::from(c.float)),
            ("value_int", DbValue::from(c.int)),
            ("value_date", DbValue::from(c.date)),
            ("value_bool", DbValue::from(c.bool)),
            ("value_enum_id", DbValue::from(c.enum_id)),
            ("value_json", DbValue::from(c.json.clone())),
            ("value_csv", DbValue::from(c.csv.clone())),
            ("generic_value_id", DbValue::from(c.generic_value_id)),
            ("generic_value_ct_id", DbValue::from(c.generic_value_ct_id)),
            ("created", DbValue::DateTime(self.created)),
            ("modified", DbValue::DateTime(self.modified)),
            ("attribute_id", DbValue::Int(self.attribute_id)),
        ]
    }

    fn set_field(&mut self, column: &str, value: &DbValue) -> EavResult<()> {
        let c = &mut self.columns;
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "entity_ct_id" => self.entity_ct_id = FromValue::from_value(value)?,
            "entity_id" => {
                if let Some(id) = Option::<i64>::from_value(value)? {
                    self.entity = EntityKey::Int(id);
                }
            }
            "entity_uuid" => {
                if let Some(uuid) = Option::<Uuid>::from_value(value)? {
                    self.entity = EntityKey::Uuid(uuid);
                }
            }
            "value_text" => c.text = FromValue::from_value(value)?,
            "value_float" => c.float = FromValue::from_value(value)?,
            "value_int" => c.int = FromValue::from_value(value)?,
            "value_date" => c.date = FromValue::from_value(value)?,
            "value_bool" => c.bool = FromValue::from_value(value)?,
            "value_enum_id" => c.enum_id = FromValue::from_value(value)?,
            "value_json" => c.json = FromValue::from_value(value)?,
            "value_csv" => c.csv = FromValue::from_value(value)?,
            "generic_value_id" => c.generic_value_id = FromValue::from_value(value)?,
            "generic_value_ct_id" => c.generic_value_ct_id = FromValue::from_value(value)?,
            "created" => self.created = FromValue::from_value(value)?,
            "modified" => self.modified = FromValue::from_value(value)?,
            "attribute_id" => self.attribute_id = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

/// Rejects a missing entity key with a uniform error.
pub(crate) fn require_entity(entity: Option<EntityRef>, model: &str) -> EavResult<EntityRef> {
    entity.ok_or_else(|| {
        EavError::DatabaseError(format!(
            "{model} instance needs a primary key before its attributes can be stored"
        ))
    })
}
