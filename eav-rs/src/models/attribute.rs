//! Attributes: the virtual columns entities can carry.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;
use eav_rs_core::{EavError, EavResult, ValidationError};
use eav_rs_db::{
    delete_model, save_model, Database, FieldDef, FieldType, FromValue, Model, ModelMeta,
    OnDelete, OrderBy, QuerySet, Value as DbValue, Q,
};
use once_cell::sync::Lazy;

use super::value::EntityRef;
use super::{now, EnumGroup, EnumValue, Value, ValueColumns, APP_LABEL};
use crate::attr_value::AttrValue;
use crate::datatype::Datatype;
use crate::slug::{generate_slug, validate_slug};
use crate::validators::{validators_for, Validator};

/// One virtual column.
///
/// The slug is the attribute's identifier in queries and on the entity
/// proxy. It is derived from the name on first save when left blank.
///
/// ```no_run
/// # use eav_rs::models::Attribute;
/// # use eav_rs::Datatype;
/// # fn demo(db: &eav_rs_db::Database) -> eav_rs_core::EavResult<()> {
/// let age = Attribute::new("Age", Datatype::Int).required(true).create(db)?;
/// assert_eq!(age.slug, "age");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub display_order: i64,
    pub datatype: Datatype,
    pub required: bool,
    pub enum_group_id: Option<i64>,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
}

impl Default for Attribute {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            slug: String::new(),
            description: None,
            display_order: 1,
            datatype: Datatype::Text,
            required: false,
            enum_group_id: None,
            created: NaiveDateTime::default(),
            modified: NaiveDateTime::default(),
        }
    }
}

impl Attribute {
    /// Starts an unsaved attribute.
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            ..Self::default()
        }
    }

    /// Sets an explicit slug.
    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    /// Marks the attribute as required.
    pub const fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the display order.
    pub const fn display_order(mut self, display_order: i64) -> Self {
        self.display_order = display_order;
        self
    }

    /// Sets the group an enum attribute draws its choices from.
    pub const fn enum_group(mut self, group: &EnumGroup) -> Self {
        self.enum_group_id = group.id;
        self
    }

    /// Saves the attribute and returns it.
    ///
    /// # Errors
    ///
    /// See [`Attribute::save`].
    pub fn create(mut self, db: &Database) -> EavResult<Self> {
        self.save(db)?;
        Ok(self)
    }

    /// Derives a missing slug, validates, and saves.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`]s of [`Attribute::full_clean`].
    pub fn save(&mut self, db: &Database) -> EavResult<()> {
        if self.slug.is_empty() {
            self.slug = generate_slug(&self.name, db.settings().slug_max_length);
        }
        self.full_clean(db)?;
        let stamp = now();
        if self.id.is_none() {
            self.created = stamp;
        }
        self.modified = stamp;
        save_model(db, self)?;
        tracing::debug!(slug = %self.slug, datatype = %self.datatype, "saved attribute");
        Ok(())
    }

    /// Validates every field, collecting all failures keyed by field name.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] with per-field errors.
    pub fn full_clean(&self, db: &Database) -> EavResult<()> {
        let settings = db.settings();
        let mut errors: HashMap<String, Vec<ValidationError>> = HashMap::new();
        let mut add = |field: &str, error: ValidationError| {
            errors.entry(field.to_string()).or_default().push(error);
        };

        if self.name.trim().is_empty() {
            add("name", ValidationError::new("This field cannot be blank.", "blank"));
        } else if self.name.chars().count() > settings.charfield_length {
            add(
                "name",
                ValidationError::new(
                    format!(
                        "Ensure this value has at most {} characters.",
                        settings.charfield_length
                    ),
                    "max_length",
                ),
            );
        }

        if let Err(error) = validate_slug(&self.slug, settings.slug_max_length) {
            add("slug", error);
        } else {
            let mut taken = Self::objects().filter(Q::exact("slug", self.slug.as_str()));
            if let Some(id) = self.id {
                taken = taken.exclude(Q::exact("pk", id));
            }
            if taken.exists_exec(db)? {
                add(
                    "slug",
                    ValidationError::new("Attribute with this Slug already exists.", "unique"),
                );
            }
        }

        match (self.datatype, self.enum_group_id) {
            (Datatype::Enum, None) => add(
                "enum_group",
                ValidationError::new(
                    "You must set the enum_group for enum datatypes",
                    "enum_group_required",
                ),
            ),
            (datatype, Some(_)) if datatype != Datatype::Enum => add(
                "enum_group",
                ValidationError::new(
                    "You can only assign an enum_group to enum datatypes",
                    "enum_group_forbidden",
                ),
            ),
            _ => {}
        }

        if let Some(id) = self.id {
            match Self::get_by_id(db, id) {
                Ok(stored) if stored.datatype != self.datatype && self.value_count(db)? > 0 => {
                    add(
                        "datatype",
                        ValidationError::new(
                            "You cannot change the datatype of an attribute that is already in use.",
                            "datatype_in_use",
                        ),
                    );
                }
                Ok(_) | Err(EavError::DoesNotExist(_)) => {}
                Err(other) => return Err(other),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::with_field_errors(errors).into())
        }
    }

    // ── Lookups ─────────────────────────────────────────────────────────

    /// Returns a query set over every attribute, ordered by name.
    pub fn objects() -> QuerySet<Self> {
        QuerySet::new()
    }

    /// Fetches an attribute by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] if there is none.
    pub fn get_by_id(db: &Database, id: i64) -> EavResult<Self> {
        Self::objects().filter(Q::exact("pk", id)).get_exec(db)
    }

    /// Fetches an attribute by slug.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] if there is none.
    pub fn get_by_slug(db: &Database, slug: &str) -> EavResult<Self> {
        Self::objects().filter(Q::exact("slug", slug)).get_exec(db)
    }

    /// Fetches an attribute by its natural key.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] if there is none.
    pub fn get_by_natural_key(db: &Database, name: &str, slug: &str) -> EavResult<Self> {
        Self::objects()
            .filter(Q::exact("name", name) & Q::exact("slug", slug))
            .get_exec(db)
    }

    /// Returns the natural key: name and slug.
    pub fn natural_key(&self) -> (String, String) {
        (self.name.clone(), self.slug.clone())
    }

    /// Loads the enum group, if one is set.
    ///
    /// # Errors
    ///
    /// Propagates lookup errors.
    pub fn get_enum_group(&self, db: &Database) -> EavResult<Option<EnumGroup>> {
        self.enum_group_id
            .map(|id| EnumGroup::get_by_id(db, id))
            .transpose()
    }

    /// Returns the choices of an enum attribute; `None` for other datatypes.
    ///
    /// # Errors
    ///
    /// Propagates lookup errors.
    pub fn get_choices(&self, db: &Database) -> EavResult<Option<Vec<EnumValue>>> {
        if self.datatype != Datatype::Enum {
            return Ok(None);
        }
        match self.get_enum_group(db)? {
            Some(group) => group.value_list(db).map(Some),
            None => Ok(Some(Vec::new())),
        }
    }

    /// Returns a query set over the rows holding this attribute's values.
    pub fn values(&self) -> QuerySet<Value> {
        Value::objects().filter(Q::exact("attribute", self.id))
    }

    /// Returns the number of stored values.
    ///
    /// # Errors
    ///
    /// Propagates query errors.
    pub fn value_count(&self, db: &Database) -> EavResult<usize> {
        if self.id.is_none() {
            return Ok(0);
        }
        self.values().count_exec(db)
    }

    pub(crate) fn saved_id(&self) -> EavResult<i64> {
        self.id.ok_or_else(|| {
            EavError::DatabaseError(format!("Attribute '{}' has not been saved", self.slug))
        })
    }

    // ── Values ──────────────────────────────────────────────────────────

    /// Returns the validators of this attribute's datatype.
    pub fn get_validators(&self) -> Vec<Validator> {
        validators_for(self.datatype)
    }

    fn invalid(&self, error: ValidationError) -> EavError {
        ValidationError::field(self.slug.clone(), error).into()
    }

    /// Brings an assigned value into the form stored for this attribute.
    ///
    /// Empty values become null. Enum labels and enum value ids are looked
    /// up; every other datatype goes through [`AttrValue::coerce`].
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] keyed by slug when the value cannot be
    /// converted.
    pub fn resolve_value(&self, db: &Database, value: &AttrValue) -> EavResult<AttrValue> {
        if value.is_empty() {
            return Ok(AttrValue::Null);
        }
        if self.datatype != Datatype::Enum {
            return value
                .coerce(self.datatype, &db.settings().csv_separator)
                .map_err(|error| self.invalid(error));
        }
        let found = match value {
            AttrValue::Text(label) => EnumValue::get_by_natural_key(db, label),
            AttrValue::Int(id) => EnumValue::get_by_id(db, *id),
            other => return Ok(other.clone()),
        };
        match found {
            Ok(choice) => Ok(AttrValue::Enum(choice)),
            Err(EavError::DoesNotExist(_)) => Err(self.invalid(
                ValidationError::new(
                    format!("'{value}' is not a valid choice for {}", self.name),
                    "invalid_choice",
                )
                .with_param("value", value.to_string()),
            )),
            Err(other) => Err(other),
        }
    }

    /// Runs the datatype validators and, for enums, the group membership
    /// check. Expects a value passed through [`Attribute::resolve_value`].
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] keyed by slug.
    pub fn validate_value(&self, db: &Database, value: &AttrValue) -> EavResult<()> {
        for validator in self.get_validators() {
            validator(value).map_err(|error| self.invalid(error))?;
        }
        if let AttrValue::Enum(choice) = value {
            let member = match self.get_enum_group(db)? {
                Some(group) => group.contains(db, choice)?,
                None => false,
            };
            if !member {
                return Err(self.invalid(ValidationError::new(
                    format!("{choice} is not a valid choice for {}", self.name),
                    "invalid_choice",
                )));
            }
        }
        Ok(())
    }

    /// Stores `value` for `entity`.
    ///
    /// A null or empty value deletes the row. Otherwise the row is created
    /// or updated in place; a value equal to the stored one writes nothing.
    ///
    /// # Errors
    ///
    /// Returns validation errors for unconvertible values and database
    /// errors from the write.
    pub fn save_value(&self, db: &Database, entity: &EntityRef, value: &AttrValue) -> EavResult<()> {
        let attribute_id = self.saved_id()?;
        let existing = Value::for_entity(entity)
            .filter(Q::exact("attribute", attribute_id))
            .first_exec(db)?;

        let value = self.resolve_value(db, value)?;
        if value.is_empty() {
            if let Some(mut row) = existing {
                delete_model(db, &mut row)?;
                tracing::debug!(slug = %self.slug, entity = %entity.key, "deleted value");
            }
            return Ok(());
        }

        let columns = ValueColumns::from_attr(self.datatype, &value, &db.settings().csv_separator)?;
        match existing {
            Some(row) if row.columns.matches(&columns, self.datatype) => {
                tracing::trace!(slug = %self.slug, entity = %entity.key, "value unchanged");
            }
            Some(mut row) => {
                row.columns = columns;
                row.save(db)?;
                tracing::debug!(slug = %self.slug, entity = %entity.key, "updated value");
            }
            None => {
                Value::new(attribute_id, *entity, columns).save(db)?;
                tracing::debug!(slug = %self.slug, entity = %entity.key, "created value");
            }
        }
        Ok(())
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.datatype.label())
    }
}

impl Model for Attribute {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| ModelMeta {
            app_label: APP_LABEL,
            model_name: "attribute",
            db_table: "eav_attribute".to_string(),
            verbose_name: "attribute".to_string(),
            ordering: vec![OrderBy::asc("name")],
            fields: vec![
                FieldDef::new("id", FieldType::AutoField).primary_key(),
                FieldDef::new("name", FieldType::CharField).max_length(100),
                FieldDef::new("slug", FieldType::CharField)
                    .max_length(50)
                    .unique(),
                FieldDef::new("description", FieldType::TextField).nullable(),
                FieldDef::new("display_order", FieldType::IntegerField),
                FieldDef::new("datatype", FieldType::CharField).max_length(6),
                FieldDef::new("required", FieldType::BooleanField),
                FieldDef::foreign_key("enum_group", EnumGroup::key(), OnDelete::Protect)
                    .nullable(),
                FieldDef::new("created", FieldType::DateTimeField),
                FieldDef::new("modified", FieldType::DateTimeField),
            ],
            constraints: vec![],
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
        vec![
            ("id", DbValue::from(self.id)),
            ("name", DbValue::from(self.name.as_str())),
            ("slug", DbValue::from(self.slug.as_str())),
            ("description", DbValue::from(self.description.clone())),
            ("display_order", DbValue::Int(self.display_order)),
            ("datatype", DbValue::from(self.datatype.as_str())),
            ("required", DbValue::Bool(self.required)),
            ("enum_group_id", DbValue::from(self.enum_group_id)),
            ("created", DbValue::DateTime(self.created)),
            ("modified", DbValue::DateTime(self.modified)),
        ]
    }

    fn set_field(&mut self, column: &str, value: &DbValue) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
            "slug" => self.slug = FromValue::from_value(value)?,
            "description" => self.description = FromValue::from_value(value)?,
            "display_order" => self.display_order = FromValue::from_value(value)?,
            "datatype" => {
                let raw: String = FromValue::from_value(value)?;
                self.datatype = raw
                    .parse()
                    .map_err(|e: ValidationError| EavError::DatabaseError(e.to_string()))?;
            }
            "required" => self.required = FromValue::from_value(value)?,
            "enum_group_id" => self.enum_group_id = FromValue::from_value(value)?,
            "created" => self.created = FromValue::from_value(value)?,
            "modified" => self.modified = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::value::EntityKey;
    use crate::testing::eav_db;
    use eav_rs_db::ContentType;

    fn yes_no(db: &Database) -> (EnumGroup, EnumValue, EnumValue) {
        let yes = EnumValue::create(db, "yes").unwrap();
        let no = EnumValue::create(db, "no").unwrap();
        let group = EnumGroup::create(db, "Yes / No").unwrap();
        group.add_values(db, &[&yes, &no]).unwrap();
        (group, yes, no)
    }

    fn entity(db: &Database, id: i64) -> EntityRef {
        EntityRef {
            content_type_id: ContentType::get_for_key(db, Attribute::key())
                .unwrap()
                .id_or_zero(),
            key: EntityKey::Int(id),
        }
    }

    #[test]
    fn test_slug_is_derived_from_name() {
        let db = eav_db();
        let attribute = Attribute::new("Body Mass Index", Datatype::Float)
            .create(&db)
            .unwrap();
        assert_eq!(attribute.slug, "body_mass_index");
        assert_eq!(attribute.display_order, 1);
        assert!(attribute.created <= attribute.modified);
    }

    #[test]
    fn test_invalid_slug_is_rejected() {
        let db = eav_db();
        let err = Attribute::new("Age", Datatype::Int)
            .slug("Not Valid")
            .create(&db)
            .unwrap_err();
        let errors = err.as_validation().unwrap();
        assert!(errors.field_errors.contains_key("slug"));
    }

    #[test]
    fn test_duplicate_slug_is_rejected() {
        let db = eav_db();
        Attribute::new("Age", Datatype::Int).create(&db).unwrap();
        let err = Attribute::new("Age", Datatype::Text).create(&db).unwrap_err();
        assert_eq!(err.as_validation().unwrap().codes(), vec!["unique"]);
    }

    #[test]
    fn test_enum_group_required_iff_enum() {
        let db = eav_db();
        let (group, ..) = yes_no(&db);
        let err = Attribute::new("Fever", Datatype::Enum).create(&db).unwrap_err();
        assert_eq!(err.as_validation().unwrap().codes(), vec!["enum_group_required"]);
        let err = Attribute::new("Age", Datatype::Int)
            .enum_group(&group)
            .create(&db)
            .unwrap_err();
        assert_eq!(err.as_validation().unwrap().codes(), vec!["enum_group_forbidden"]);
        assert!(Attribute::new("Fever", Datatype::Enum)
            .enum_group(&group)
            .create(&db)
            .is_ok());
    }

    #[test]
    fn test_datatype_is_frozen_once_used() {
        let db = eav_db();
        let mut attribute = Attribute::new("Age", Datatype::Int).create(&db).unwrap();
        attribute.datatype = Datatype::Float;
        attribute.save(&db).unwrap();

        attribute
            .save_value(&db, &entity(&db, 1), &AttrValue::Float(3.5))
            .unwrap();
        attribute.datatype = Datatype::Text;
        let err = attribute.save(&db).unwrap_err();
        assert_eq!(err.as_validation().unwrap().codes(), vec!["datatype_in_use"]);
    }

    #[test]
    fn test_save_value_creates_updates_and_deletes() {
        let db = eav_db();
        let attribute = Attribute::new("Age", Datatype::Int).create(&db).unwrap();
        let entity = entity(&db, 1);

        attribute.save_value(&db, &entity, &AttrValue::Int(3)).unwrap();
        let row = attribute.values().get_exec(&db).unwrap();
        assert_eq!(row.columns.int, Some(3));

        attribute.save_value(&db, &entity, &"4".into()).unwrap();
        let updated = attribute.values().get_exec(&db).unwrap();
        assert_eq!(updated.id, row.id);
        assert_eq!(updated.columns.int, Some(4));

        attribute.save_value(&db, &entity, &AttrValue::Null).unwrap();
        assert_eq!(attribute.value_count(&db).unwrap(), 0);
    }

    #[test]
    fn test_unchanged_value_is_not_written() {
        let db = eav_db();
        let attribute = Attribute::new("City", Datatype::Text).create(&db).unwrap();
        let entity = entity(&db, 1);
        attribute.save_value(&db, &entity, &"Paris".into()).unwrap();
        let before = attribute.values().get_exec(&db).unwrap();
        attribute.save_value(&db, &entity, &"Paris".into()).unwrap();
        let after = attribute.values().get_exec(&db).unwrap();
        assert_eq!(before.modified, after.modified);
    }

    #[test]
    fn test_enum_labels_resolve() {
        let db = eav_db();
        let (group, yes, _) = yes_no(&db);
        let fever = Attribute::new("Fever", Datatype::Enum)
            .enum_group(&group)
            .create(&db)
            .unwrap();
        assert_eq!(fever.resolve_value(&db, &"yes".into()).unwrap(), yes.clone().into());
        assert_eq!(
            fever.resolve_value(&db, &AttrValue::Int(yes.id.unwrap())).unwrap(),
            yes.into()
        );
        let err = fever.resolve_value(&db, &"maybe".into()).unwrap_err();
        assert_eq!(err.as_validation().unwrap().codes(), vec!["invalid_choice"]);
    }

    #[test]
    fn test_enum_membership_is_checked() {
        let db = eav_db();
        let (group, yes, _) = yes_no(&db);
        let outsider = EnumValue::create(&db, "unknown").unwrap();
        let fever = Attribute::new("Fever", Datatype::Enum)
            .enum_group(&group)
            .create(&db)
            .unwrap();
        assert!(fever.validate_value(&db, &yes.into()).is_ok());
        assert!(fever.validate_value(&db, &outsider.clone().into()).is_err());
        assert!(fever
            .save_value(&db, &entity(&db, 1), &outsider.into())
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_choices_and_display() {
        let db = eav_db();
        let (group, yes, no) = yes_no(&db);
        let fever = Attribute::new("Fever", Datatype::Enum)
            .enum_group(&group)
            .create(&db)
            .unwrap();
        assert_eq!(fever.get_choices(&db).unwrap(), Some(vec![yes, no]));
        assert_eq!(fever.to_string(), "Fever (Multiple Choice)");

        let age = Attribute::new("Age", Datatype::Int).create(&db).unwrap();
        assert_eq!(age.get_choices(&db).unwrap(), None);
        assert_eq!(age.to_string(), "Age (Integer)");
    }

    #[test]
    fn test_natural_key_and_ordering() {
        let db = eav_db();
        Attribute::new("Zeta", Datatype::Text).create(&db).unwrap();
        let alpha = Attribute::new("Alpha", Datatype::Text).create(&db).unwrap();
        assert_eq!(
            Attribute::get_by_natural_key(&db, "Alpha", "alpha").unwrap(),
            alpha
        );
        let names: Vec<String> = Attribute::objects()
            .execute_query(&db)
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_protected_while_referenced() {
        let db = eav_db();
        let mut attribute = Attribute::new("Age", Datatype::Int).create(&db).unwrap();
        attribute.save_value(&db, &entity(&db, 1), &AttrValue::Int(1)).unwrap();
        let err = delete_model(&db, &mut attribute).unwrap_err();
        assert!(matches!(err, EavError::IntegrityError(_)));
    }
}
