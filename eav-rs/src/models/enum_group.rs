//! Named sets of enum choices.

use std::fmt;

use eav_rs_core::{EavError, EavResult, ValidationError};
use eav_rs_db::constraints::UniqueConstraint;
use eav_rs_db::{
    save_model, Database, FieldDef, FieldType, FromValue, Model, ModelMeta, OnDelete, QuerySet,
    Value as DbValue, Q,
};
use once_cell::sync::Lazy;

use super::{EnumValue, APP_LABEL};

/// A named, reusable set of [`EnumValue`]s. An enum attribute draws its
/// choices from exactly one group.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnumGroup {
    pub id: Option<i64>,
    pub name: String,
}

impl EnumGroup {
    /// Creates an unsaved group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// Creates and saves a group.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name and an integrity error if
    /// the name is taken.
    pub fn create(db: &Database, name: impl Into<String>) -> EavResult<Self> {
        let mut group = Self::new(name);
        group.save(db)?;
        Ok(group)
    }

    /// Validates and saves this group.
    ///
    /// # Errors
    ///
    /// See [`EnumGroup::create`].
    pub fn save(&mut self, db: &Database) -> EavResult<()> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::field(
                "name",
                ValidationError::new("This field cannot be blank.", "blank"),
            )
            .into());
        }
        save_model(db, self)?;
        Ok(())
    }

    /// Returns a query set over every group.
    pub fn objects() -> QuerySet<Self> {
        QuerySet::new()
    }

    /// Fetches a group by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] if there is none.
    pub fn get_by_id(db: &Database, id: i64) -> EavResult<Self> {
        Self::objects().filter(Q::exact("pk", id)).get_exec(db)
    }

    /// Fetches a group by name, its natural key.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DoesNotExist`] if there is none.
    pub fn get_by_natural_key(db: &Database, name: &str) -> EavResult<Self> {
        Self::objects().filter(Q::exact("name", name)).get_exec(db)
    }

    /// Returns the natural key: the name.
    pub fn natural_key(&self) -> (String,) {
        (self.name.clone(),)
    }

    fn saved_id(&self) -> EavResult<i64> {
        self.id.ok_or_else(|| {
            EavError::DatabaseError(format!("EnumGroup '{}' has not been saved", self.name))
        })
    }

    /// Adds a choice to the group. Adding a member again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DatabaseError`] if either side is unsaved.
    pub fn add_value(&self, db: &Database, choice: &EnumValue) -> EavResult<()> {
        let group_id = self.saved_id()?;
        let value_id = choice.saved_id()?;
        if self.contains(db, choice)? {
            return Ok(());
        }
        let mut link = EnumGroupValue {
            id: None,
            enumgroup_id: group_id,
            enumvalue_id: value_id,
        };
        save_model(db, &mut link)?;
        Ok(())
    }

    /// Adds several choices.
    ///
    /// # Errors
    ///
    /// See [`EnumGroup::add_value`].
    pub fn add_values(&self, db: &Database, choices: &[&EnumValue]) -> EavResult<()> {
        for choice in choices {
            self.add_value(db, choice)?;
        }
        Ok(())
    }

    /// Removes a choice from the group. Returns `true` if it was a member.
    ///
    /// # Errors
    ///
    /// Returns [`EavError::DatabaseError`] if either side is unsaved.
    pub fn remove_value(&self, db: &Database, choice: &EnumValue) -> EavResult<bool> {
        let links = QuerySet::<EnumGroupValue>::new().filter(
            Q::exact("enumgroup", self.saved_id()?) & Q::exact("enumvalue", choice.saved_id()?),
        );
        Ok(links.delete_exec(db)? > 0)
    }

    /// Returns a query set over the group's choices.
    pub fn values(&self) -> QuerySet<EnumValue> {
        EnumValue::objects().filter(Q::exact("enumgroupvalue__enumgroup", self.id))
    }

    /// Returns the group's choices, ordered by id.
    ///
    /// # Errors
    ///
    /// Propagates query errors.
    pub fn value_list(&self, db: &Database) -> EavResult<Vec<EnumValue>> {
        self.values().order_by(&["id"]).execute_query(db)
    }

    /// Returns `true` if `choice` is a member of the group.
    ///
    /// # Errors
    ///
    /// Propagates query errors.
    pub fn contains(&self, db: &Database, choice: &EnumValue) -> EavResult<bool> {
        match (self.id, choice.id) {
            (Some(group_id), Some(value_id)) => QuerySet::<EnumGroupValue>::new()
                .filter(Q::exact("enumgroup", group_id) & Q::exact("enumvalue", value_id))
                .exists_exec(db),
            _ => Ok(false),
        }
    }
}

impl fmt::Display for EnumGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Model for EnumGroup {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| ModelMeta {
            app_label: APP_LABEL,
            model_name: "enumgroup",
            db_table: "eav_enumgroup".to_string(),
            verbose_name: "enum group".to_string(),
            ordering: vec![],
            fields: vec![
                FieldDef::new("id", FieldType::AutoField).primary_key(),
                FieldDef::new("name", FieldType::CharField)
                    .max_length(100)
                    .unique(),
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
        ]
    }

    fn set_field(&mut self, column: &str, value: &DbValue) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

/// Membership of an [`EnumValue`] in an [`EnumGroup`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnumGroupValue {
    pub id: Option<i64>,
    pub enumgroup_id: i64,
    pub enumvalue_id: i64,
}

impl Model for EnumGroupValue {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| ModelMeta {
            app_label: APP_LABEL,
            model_name: "enumgroupvalue",
            db_table: "eav_enumgroup_values".to_string(),
            verbose_name: "enum group membership".to_string(),
            ordering: vec![],
            fields: vec![
                FieldDef::new("id", FieldType::AutoField).primary_key(),
                FieldDef::foreign_key("enumgroup", EnumGroup::key(), OnDelete::Cascade),
                FieldDef::foreign_key("enumvalue", EnumValue::key(), OnDelete::Cascade),
            ],
            constraints: vec![Box::new(UniqueConstraint::new(
                "eav_enumgroup_values_unique",
                &["enumgroup_id", "enumvalue_id"],
            ))],
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
            ("enumgroup_id", DbValue::Int(self.enumgroup_id)),
            ("enumvalue_id", DbValue::Int(self.enumvalue_id)),
        ]
    }

    fn set_field(&mut self, column: &str, value: &DbValue) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "enumgroup_id" => self.enumgroup_id = FromValue::from_value(value)?,
            "enumvalue_id" => self.enumvalue_id = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::eav_db;

    #[test]
    fn test_membership() {
        let db = eav_db();
        let yes = EnumValue::create(&db, "yes").unwrap();
        let no = EnumValue::create(&db, "no").unwrap();
        let unknown = EnumValue::create(&db, "unknown").unwrap();
        let group = EnumGroup::create(&db, "Yes / No").unwrap();
        group.add_values(&db, &[&yes, &no]).unwrap();
        group.add_value(&db, &yes).unwrap();

        assert!(group.contains(&db, &yes).unwrap());
        assert!(!group.contains(&db, &unknown).unwrap());
        assert_eq!(group.value_list(&db).unwrap(), vec![yes.clone(), no.clone()]);
        assert_eq!(group.values().count_exec(&db).unwrap(), 2);

        assert!(group.remove_value(&db, &no).unwrap());
        assert!(!group.remove_value(&db, &no).unwrap());
        assert_eq!(group.value_list(&db).unwrap(), vec![yes]);
    }

    #[test]
    fn test_values_are_shared_between_groups() {
        let db = eav_db();
        let yes = EnumValue::create(&db, "yes").unwrap();
        let first = EnumGroup::create(&db, "first").unwrap();
        let second = EnumGroup::create(&db, "second").unwrap();
        first.add_value(&db, &yes).unwrap();
        second.add_value(&db, &yes).unwrap();
        assert!(first.contains(&db, &yes).unwrap());
        assert!(second.contains(&db, &yes).unwrap());
        assert_eq!(first.values().count_exec(&db).unwrap(), 1);
    }

    #[test]
    fn test_unsaved_sides() {
        let db = eav_db();
        let group = EnumGroup::new("draft");
        let yes = EnumValue::create(&db, "yes").unwrap();
        assert!(group.add_value(&db, &yes).is_err());
        assert!(!group.contains(&db, &yes).unwrap());
        let saved = EnumGroup::create(&db, "saved").unwrap();
        assert!(saved.add_value(&db, &EnumValue::new("nope")).is_err());
    }

    #[test]
    fn test_natural_key_and_display() {
        let db = eav_db();
        let group = EnumGroup::create(&db, "Yes / No / Unknown").unwrap();
        assert_eq!(group.to_string(), "Yes / No / Unknown");
        assert_eq!(
            EnumGroup::get_by_natural_key(&db, "Yes / No / Unknown").unwrap(),
            group
        );
        assert_eq!(EnumGroup::get_by_id(&db, group.id.unwrap()).unwrap().name, group.name);
        assert!(EnumGroup::create(&db, "").unwrap_err().is_validation());
    }
}
