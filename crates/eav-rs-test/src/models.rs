//! Host models used by the eav-rs test suites.
//!
//! Shaped like a small clinical application: patients with an optional
//! [`ExampleModel`] link, encounters belonging to a patient, UUID-keyed
//! doctors, and a bare model used by registration tests. Every model carries
//! [`Slots`] so the attribute proxy can be attached to it.

use eav_rs_core::EavResult;
use eav_rs_db::{
    Database, FieldDef, FieldType, FromValue, Model, ModelMeta, OnDelete, Slots, Value,
};
use once_cell::sync::Lazy;

const APP_LABEL: &str = "test_project";

fn meta(model_name: &'static str, fields: Vec<FieldDef>) -> ModelMeta {
    ModelMeta {
        app_label: APP_LABEL,
        model_name,
        db_table: format!("{APP_LABEL}_{model_name}"),
        verbose_name: model_name.to_string(),
        ordering: vec![],
        fields,
        constraints: vec![],
    }
}

/// Creates the tables of every fixture model.
///
/// # Errors
///
/// Propagates table creation errors.
pub fn create_fixture_tables(db: &Database) -> EavResult<()> {
    db.create_table::<ExampleModel>()?;
    db.create_table::<Patient>()?;
    db.create_table::<Encounter>()?;
    db.create_table::<Doctor>()?;
    db.create_table::<RegisterTestModel>()?;
    Ok(())
}

/// A patient, optionally linked to an [`ExampleModel`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Patient {
    pub id: Option<i64>,
    pub name: String,
    pub email: Option<String>,
    pub example_id: Option<i64>,
    pub slots: Slots,
}

impl Patient {
    /// Creates an unsaved patient.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Model for Patient {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| {
            meta(
                "patient",
                vec![
                    FieldDef::new("id", FieldType::AutoField).primary_key(),
                    FieldDef::new("name", FieldType::CharField).max_length(12),
                    FieldDef::new("email", FieldType::CharField)
                        .max_length(254)
                        .nullable(),
                    FieldDef::foreign_key("example", ExampleModel::key(), OnDelete::Protect)
                        .nullable(),
                ],
            )
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
            ("email", Value::from(self.email.clone())),
            ("example_id", Value::from(self.example_id)),
        ]
    }

    fn set_field(&mut self, column: &str, value: &Value) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
            "email" => self.email = FromValue::from_value(value)?,
            "example_id" => self.example_id = FromValue::from_value(value)?,
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

/// One visit of a [`Patient`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Encounter {
    pub id: Option<i64>,
    pub num: i64,
    pub patient_id: Option<i64>,
    pub slots: Slots,
}

impl Encounter {
    /// Creates an unsaved encounter of a saved patient.
    pub fn of(patient: &Patient, num: i64) -> Self {
        Self {
            num,
            patient_id: patient.id,
            ..Self::default()
        }
    }
}

impl Model for Encounter {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| {
            meta(
                "encounter",
                vec![
                    FieldDef::new("id", FieldType::AutoField).primary_key(),
                    FieldDef::new("num", FieldType::IntegerField),
                    FieldDef::foreign_key("patient", Patient::key(), OnDelete::Protect),
                ],
            )
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
            ("num", Value::Int(self.num)),
            ("patient_id", Value::from(self.patient_id)),
        ]
    }

    fn set_field(&mut self, column: &str, value: &Value) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "num" => self.num = FromValue::from_value(value)?,
            "patient_id" => self.patient_id = FromValue::from_value(value)?,
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

/// A named model patients may point at.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExampleModel {
    pub id: Option<i64>,
    pub name: String,
    pub slots: Slots,
}

impl Model for ExampleModel {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| {
            meta(
                "examplemodel",
                vec![
                    FieldDef::new("id", FieldType::AutoField).primary_key(),
                    FieldDef::new("name", FieldType::CharField).max_length(12),
                ],
            )
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
        ]
    }

    fn set_field(&mut self, column: &str, value: &Value) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
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

/// A UUID-keyed host model.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Doctor {
    pub id: Option<uuid::Uuid>,
    pub name: String,
    pub slots: Slots,
}

impl Model for Doctor {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| {
            meta(
                "doctor",
                vec![
                    FieldDef::new("id", FieldType::UuidField).primary_key(),
                    FieldDef::new("name", FieldType::CharField).max_length(12),
                ],
            )
        });
        &META
    }

    fn pk(&self) -> Option<Value> {
        self.id.map(Value::Uuid)
    }

    fn set_pk(&mut self, value: Value) {
        self.id = uuid::Uuid::from_value(&value).ok();
    }

    fn field_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("name", Value::from(self.name.as_str())),
        ]
    }

    fn set_field(&mut self, column: &str, value: &Value) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
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

/// A bare model registered and unregistered by registry tests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RegisterTestModel {
    pub id: Option<i64>,
    pub name: String,
    pub slots: Slots,
}

impl Model for RegisterTestModel {
    fn meta() -> &'static ModelMeta {
        static META: Lazy<ModelMeta> = Lazy::new(|| {
            meta(
                "registertestmodel",
                vec![
                    FieldDef::new("id", FieldType::AutoField).primary_key(),
                    FieldDef::new("name", FieldType::CharField).max_length(12),
                ],
            )
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
        ]
    }

    fn set_field(&mut self, column: &str, value: &Value) -> EavResult<()> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_database::TestDatabase;
    use eav_rs_db::{refresh_from_db, save_model};

    #[test]
    fn test_fixture_tables_round_trip() {
        let db = TestDatabase::with_fixtures();
        let mut example = ExampleModel {
            name: "ex".into(),
            ..ExampleModel::default()
        };
        save_model(&db, &mut example).unwrap();
        let mut patient = Patient {
            example_id: example.id,
            ..Patient::named("Anne")
        };
        save_model(&db, &mut patient).unwrap();
        let mut encounter = Encounter::of(&patient, 1);
        save_model(&db, &mut encounter).unwrap();

        let mut fresh = Patient {
            id: patient.id,
            ..Patient::default()
        };
        refresh_from_db(&db, &mut fresh).unwrap();
        assert_eq!(fresh.name, "Anne");
        assert_eq!(fresh.example_id, example.id);
    }

    #[test]
    fn test_doctor_gets_uuid_on_save() {
        let db = TestDatabase::with_fixtures();
        let mut doctor = Doctor {
            name: "Who".into(),
            ..Doctor::default()
        };
        save_model(&db, &mut doctor).unwrap();
        assert!(doctor.id.is_some());
    }

    #[test]
    fn test_protected_patient_cannot_be_deleted() {
        let db = TestDatabase::with_fixtures();
        let mut patient = Patient::named("Bob");
        save_model(&db, &mut patient).unwrap();
        save_model(&db, &mut Encounter::of(&patient, 1)).unwrap();
        assert!(eav_rs_db::delete_model(&db, &mut patient).is_err());
    }
}
