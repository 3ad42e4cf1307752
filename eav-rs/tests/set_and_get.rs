//! Integration tests for reading and writing attributes through the proxy.
//!
//! Tests cover: every datatype written and read back, reads of unset
//! attributes, in-place updates, unchanged writes, deletion by empty
//! assignment, UUID-keyed entities, and value cleanup on entity deletion.

use chrono::{NaiveDate, NaiveTime, SubsecRound};
use eav_rs::models::{Attribute, EnumGroup, EnumValue, Value};
use eav_rs::{AttrValue, Config, Datatype, EntityAccess, ObjectRef, Registry};
use eav_rs_db::{delete_model, init_instance, kwargs, save_model, Database, ModelManager, Q};
use eav_rs_test::{assert_num_queries, Doctor, ExampleModel, Patient, TestDatabase};
use serde_json::json;

fn setup() -> (TestDatabase, Registry) {
    let db = TestDatabase::with_fixtures();
    eav_rs::install(&db).unwrap();
    let registry = Registry::new();
    registry.register::<Patient>(&db, Config::default().into_arc()).unwrap();
    (db, registry)
}

fn new_patient(db: &Database, name: &str) -> Patient {
    let mut patient = Patient::named(name);
    init_instance(db, &mut patient).unwrap();
    patient
}

fn reload(db: &Database, patient: &Patient) -> Patient {
    db.manager::<Patient>()
        .unwrap()
        .filter(Q::exact("pk", patient.id))
        .get_exec(db)
        .unwrap()
}

#[test]
fn test_unset_attribute_reads_null() {
    let (db, _registry) = setup();
    Attribute::new("Age", Datatype::Int).create(&db).unwrap();
    let mut patient = new_patient(&db, "Anne");
    save_model(&db, &mut patient).unwrap();

    assert!(patient.eav().unwrap().get(&db, "age").unwrap().is_null());
    assert_eq!(Value::objects().count_exec(&db).unwrap(), 0);
}

#[test]
fn test_every_datatype_round_trips() {
    let (db, _registry) = setup();
    let yes = EnumValue::create(&db, "yes").unwrap();
    let no = EnumValue::create(&db, "no").unwrap();
    let group = EnumGroup::create(&db, "Yes / No").unwrap();
    group.add_values(&db, &[&yes, &no]).unwrap();

    Attribute::new("City", Datatype::Text).create(&db).unwrap();
    Attribute::new("Height", Datatype::Float).create(&db).unwrap();
    Attribute::new("Age", Datatype::Int).create(&db).unwrap();
    Attribute::new("Born", Datatype::Date).create(&db).unwrap();
    Attribute::new("Pregnant", Datatype::Bool).create(&db).unwrap();
    Attribute::new("Fever", Datatype::Enum)
        .enum_group(&group)
        .create(&db)
        .unwrap();
    Attribute::new("Clinic", Datatype::Object).create(&db).unwrap();
    Attribute::new("Extra", Datatype::Json).create(&db).unwrap();
    Attribute::new("Symptoms", Datatype::Csv).create(&db).unwrap();

    let mut clinic = ExampleModel {
        name: "North".to_string(),
        ..ExampleModel::default()
    };
    save_model(&db, &mut clinic).unwrap();
    let clinic_ref = ObjectRef::of(&db, &clinic).unwrap();
    let born = NaiveDate::from_ymd_opt(1990, 4, 12).unwrap();

    let mut patient = new_patient(&db, "Bob");
    patient
        .eav_mut()
        .unwrap()
        .set("city", "Bamako")
        .set("height", "1.82")
        .set("age", 34)
        .set("born", born)
        .set("pregnant", false)
        .set("fever", "yes")
        .set("clinic", clinic_ref)
        .set("extra", json!({"allergies": ["penicillin"]}))
        .set("symptoms", "cough;headache");
    save_model(&db, &mut patient).unwrap();
    assert_eq!(Value::objects().count_exec(&db).unwrap(), 9);

    let loaded = reload(&db, &patient);
    let proxy = loaded.eav().unwrap();
    assert_eq!(proxy.get(&db, "city").unwrap(), AttrValue::Text("Bamako".into()));
    assert_eq!(proxy.get(&db, "height").unwrap(), AttrValue::Float(1.82));
    assert_eq!(proxy.get(&db, "age").unwrap(), AttrValue::Int(34));
    assert_eq!(
        proxy.get(&db, "born").unwrap(),
        AttrValue::Date(born.and_time(NaiveTime::MIN))
    );
    assert_eq!(proxy.get(&db, "pregnant").unwrap(), AttrValue::Bool(false));
    assert_eq!(proxy.get(&db, "fever").unwrap(), AttrValue::Enum(yes));
    assert_eq!(proxy.get(&db, "clinic").unwrap(), AttrValue::Object(clinic_ref));
    assert_eq!(
        proxy.get(&db, "extra").unwrap(),
        AttrValue::Json(json!({"allergies": ["penicillin"]}))
    );
    assert_eq!(
        proxy.get(&db, "symptoms").unwrap(),
        AttrValue::Csv(vec!["cough".into(), "headache".into()])
    );

    let resolved: ExampleModel = proxy
        .get(&db, "clinic")
        .unwrap()
        .as_object()
        .unwrap()
        .resolve(&db)
        .unwrap();
    assert_eq!(resolved.name, "North");

    let dict = proxy.get_values_dict(&db).unwrap();
    assert_eq!(dict.len(), 9);
    assert_eq!(dict["age"], AttrValue::Int(34));
}

#[test]
fn test_reads_cost_one_query_per_lookup() {
    let (db, _registry) = setup();
    Attribute::new("Age", Datatype::Int).create(&db).unwrap();
    let mut patient = new_patient(&db, "Zoe");
    patient.eav_mut().unwrap().set("age", 9);
    save_model(&db, &mut patient).unwrap();
    let loaded = reload(&db, &patient);

    // Buffered: the attribute only.
    assert_num_queries(&db, 1, || {
        assert_eq!(patient.eav().unwrap().get(&db, "age").unwrap(), AttrValue::Int(9));
    });
    // Stored: the attribute, then its row.
    assert_num_queries(&db, 2, || {
        assert_eq!(loaded.eav().unwrap().get(&db, "age").unwrap(), AttrValue::Int(9));
    });
}

#[test]
fn test_update_in_place_and_unchanged_writes() {
    let (db, _registry) = setup();
    Attribute::new("Age", Datatype::Int).create(&db).unwrap();
    let mut patient = new_patient(&db, "Cyrill");
    patient.eav_mut().unwrap().set("age", 15);
    save_model(&db, &mut patient).unwrap();

    let first = Value::objects().get_exec(&db).unwrap();

    // Saving again writes nothing.
    save_model(&db, &mut patient).unwrap();
    let again = Value::objects().get_exec(&db).unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.modified, first.modified);

    // A new value updates the row in place.
    patient.eav_mut().unwrap().set("age", 16);
    save_model(&db, &mut patient).unwrap();
    let updated = Value::objects().get_exec(&db).unwrap();
    assert_eq!(updated.id, first.id);
    assert_eq!(updated.columns.int, Some(16));
    assert_eq!(updated.created, first.created);
}

#[test]
fn test_dates_keep_microsecond_precision() {
    let (db, _registry) = setup();
    Attribute::new("Seen", Datatype::Date).create(&db).unwrap();
    let seen = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_nano_opt(3, 4, 5, 123_456_789)
        .unwrap();
    let mut patient = new_patient(&db, "Fatou");
    patient.eav_mut().unwrap().set("seen", seen);
    save_model(&db, &mut patient).unwrap();
    let first = Value::objects().get_exec(&db).unwrap();

    save_model(&db, &mut patient).unwrap();
    let again = Value::objects().get_exec(&db).unwrap();
    assert_eq!(again.modified, first.modified);

    let expected = AttrValue::Date(seen.trunc_subsecs(6));
    assert_eq!(patient.eav().unwrap().get(&db, "seen").unwrap(), expected);
    let loaded = reload(&db, &patient);
    assert_eq!(loaded.eav().unwrap().get(&db, "seen").unwrap(), expected);
}

#[test]
fn test_saved_attribute_equals_its_reload() {
    let (db, _registry) = setup();
    let age = Attribute::new("Age", Datatype::Int).create(&db).unwrap();
    assert_eq!(Attribute::get_by_slug(&db, "age").unwrap(), age);
}

#[test]
fn test_empty_text_clears_a_typed_value() {
    let (db, _registry) = setup();
    Attribute::new("Age", Datatype::Int).create(&db).unwrap();
    let mut patient = new_patient(&db, "Gaspard");
    patient.eav_mut().unwrap().set("age", 3);
    save_model(&db, &mut patient).unwrap();
    assert_eq!(Value::objects().count_exec(&db).unwrap(), 1);

    patient.eav_mut().unwrap().set("age", "");
    save_model(&db, &mut patient).unwrap();
    assert_eq!(Value::objects().count_exec(&db).unwrap(), 0);
    assert!(patient.eav().unwrap().get(&db, "age").unwrap().is_null());
}

#[test]
fn test_empty_assignment_deletes_the_row() {
    let (db, _registry) = setup();
    Attribute::new("City", Datatype::Text).create(&db).unwrap();
    Attribute::new("Symptoms", Datatype::Csv).create(&db).unwrap();
    let mut patient = new_patient(&db, "Daniel");
    patient
        .eav_mut()
        .unwrap()
        .set("city", "Nice")
        .set("symptoms", vec!["cough"]);
    save_model(&db, &mut patient).unwrap();
    assert_eq!(Value::objects().count_exec(&db).unwrap(), 2);

    patient
        .eav_mut()
        .unwrap()
        .set("city", AttrValue::Null)
        .set("symptoms", Vec::<String>::new());
    save_model(&db, &mut patient).unwrap();
    assert_eq!(Value::objects().count_exec(&db).unwrap(), 0);

    let loaded = reload(&db, &patient);
    assert!(loaded.eav().unwrap().get(&db, "city").unwrap().is_null());
}

#[test]
fn test_unbuffered_attributes_are_left_alone() {
    let (db, _registry) = setup();
    Attribute::new("Age", Datatype::Int).create(&db).unwrap();
    Attribute::new("City", Datatype::Text).create(&db).unwrap();
    let patient = db
        .manager::<Patient>()
        .unwrap()
        .create(&db, &kwargs! { "name" => "Eugene", "eav__age" => 2, "eav__city" => "France" })
        .unwrap();

    let mut loaded = reload(&db, &patient);
    loaded.eav_mut().unwrap().set("age", 3);
    save_model(&db, &mut loaded).unwrap();

    let proxy = reload(&db, &patient);
    assert_eq!(proxy.eav().unwrap().get(&db, "age").unwrap(), AttrValue::Int(3));
    assert_eq!(
        proxy.eav().unwrap().get(&db, "city").unwrap(),
        AttrValue::Text("France".into())
    );
}

#[test]
fn test_entity_deletion_removes_its_values() {
    let (db, _registry) = setup();
    Attribute::new("Age", Datatype::Int).create(&db).unwrap();
    let manager = db.manager::<Patient>().unwrap();
    let mut anne = manager
        .create(&db, &kwargs! { "name" => "Anne", "eav__age" => 3 })
        .unwrap();
    manager
        .create(&db, &kwargs! { "name" => "Bob", "eav__age" => 15 })
        .unwrap();

    delete_model(&db, &mut anne).unwrap();
    let remaining = Value::objects().execute_query(&db).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].columns.int, Some(15));
}

#[test]
fn test_uuid_keyed_entities() {
    let (db, registry) = setup();
    registry.register::<Doctor>(&db, Config::default().into_arc()).unwrap();
    Attribute::new("Specialty", Datatype::Text).create(&db).unwrap();

    let doctors = db.manager::<Doctor>().unwrap();
    let house = doctors
        .create(&db, &kwargs! { "name" => "House", "eav__specialty" => "diagnostics" })
        .unwrap();
    doctors
        .create(&db, &kwargs! { "name" => "Grey", "eav__specialty" => "surgery" })
        .unwrap();

    let value = Value::objects().filter(Q::exact("entity_uuid", house.id)).get_exec(&db).unwrap();
    assert_eq!(value.entity.to_string(), house.id.unwrap().to_string());

    let found = doctors
        .filter_kwargs(kwargs! { "eav__specialty" => "diagnostics" })
        .get_exec(&db)
        .unwrap();
    assert_eq!(found.id, house.id);

    let ordered = doctors.all().order_by(&["-eav__specialty"]).execute_query(&db).unwrap();
    let names: Vec<&str> = ordered.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["Grey", "House"]);
}

#[test]
fn test_value_display_and_natural_key() {
    let (db, _registry) = setup();
    let age = Attribute::new("Age", Datatype::Int).create(&db).unwrap();
    let anne = db
        .manager::<Patient>()
        .unwrap()
        .create(&db, &kwargs! { "name" => "Anne", "eav__age" => 3 })
        .unwrap();

    let value = Value::objects().get_exec(&db).unwrap();
    let ((name, slug), entity) = value.natural_key(&db).unwrap();
    assert_eq!((name.as_str(), slug.as_str()), ("Age", "age"));
    assert_eq!(entity.key.to_string(), anne.id.unwrap().to_string());

    let same = Value::get_by_natural_key(&db, (age.name.as_str(), age.slug.as_str()), &entity).unwrap();
    assert_eq!(same.id, value.id);
    assert_eq!(
        value.describe(&db).unwrap(),
        format!("Age: \"3\" (test_project.patient {})", anne.id.unwrap())
    );
}
