//! Model CRUD operations.
//!
//! Free functions that save, delete, reload, and initialize model instances
//! while dispatching the lifecycle signals of the [`Database`]. Saves and
//! deletes run inside [`atomic`], so a failing receiver rolls back the
//! whole write, including anything other receivers wrote.

use eav_rs_core::{EavError, EavResult};

use crate::connection::Database;
use crate::model::{Model, ModelInstance};
use crate::query::compiler::SqlCompiler;
use crate::signals::{Signal, SignalContext};
use crate::transactions::atomic;
use crate::value::Value;

fn send(db: &Database, signal: &Signal, instance: &mut dyn ModelInstance, created: bool) -> EavResult<()> {
    let mut ctx = SignalContext {
        db,
        sender: instance.model_key(),
        instance,
        created,
    };
    signal.send(&mut ctx)
}

/// Fires `post_init` for a freshly constructed instance.
///
/// # Errors
///
/// Returns the first receiver error.
pub fn init_instance<M: Model>(db: &Database, instance: &mut M) -> EavResult<()> {
    send(db, &db.signals().post_init, instance, false)
}

/// Saves an instance, inserting or updating as needed.
///
/// An instance without a primary key is inserted; UUID keys are generated,
/// auto-increment ids are read back. An instance with a primary key is
/// updated, and inserted if no row was updated. Returns `true` if a row was
/// inserted.
///
/// # Errors
///
/// Returns receiver errors (`pre_save` aborts before any write) and
/// database errors; everything is rolled back.
pub fn save_model<M: Model>(db: &Database, instance: &mut M) -> EavResult<bool> {
    atomic(db, |db| {
        send(db, &db.signals().pre_save, instance, false)?;

        let meta = M::meta();
        let created = match instance.pk().filter(|pk| !pk.is_null()) {
            None if meta.has_uuid_pk() => {
                instance.set_pk(Value::Uuid(uuid::Uuid::new_v4()));
                let (sql, params) =
                    SqlCompiler::compile_insert(&meta.db_table, &instance.field_values());
                db.execute(&sql, &params)?;
                true
            }
            None => {
                let (sql, params) =
                    SqlCompiler::compile_insert(&meta.db_table, &instance.non_pk_field_values());
                let id = db.insert_returning_id(&sql, &params)?;
                instance.set_pk(Value::Int(id));
                true
            }
            Some(pk) => {
                let fields = instance.non_pk_field_values();
                let updated = if fields.is_empty() {
                    db.query(
                        &format!(
                            "SELECT 1 FROM \"{}\" WHERE \"{}\" = ?",
                            meta.db_table,
                            meta.pk_column()
                        ),
                        &[pk.clone()],
                    )?
                    .len()
                } else {
                    let (sql, params) =
                        SqlCompiler::compile_update(&meta.db_table, &fields, meta.pk_column(), &pk);
                    db.execute(&sql, &params)?
                };
                if updated == 0 {
                    let (sql, params) =
                        SqlCompiler::compile_insert(&meta.db_table, &instance.field_values());
                    db.execute(&sql, &params)?;
                }
                updated == 0
            }
        };
        tracing::debug!(model = %M::key(), pk = ?instance.pk(), created, "saved");

        send(db, &db.signals().post_save, instance, created)?;
        Ok(created)
    })
}

/// Deletes an instance's row, along with the rows of every generic
/// relation declared on its model.
///
/// # Errors
///
/// Returns [`EavError::DatabaseError`] for unsaved instances, receiver
/// errors, and database errors (e.g. a protected foreign key).
pub fn delete_model<M: Model>(db: &Database, instance: &mut M) -> EavResult<()> {
    let pk = instance
        .pk()
        .filter(|pk| !pk.is_null())
        .ok_or_else(|| {
            EavError::DatabaseError(format!(
                "{} object can't be deleted because its pk is None",
                M::key()
            ))
        })?;

    atomic(db, |db| {
        send(db, &db.signals().pre_delete, instance, false)?;

        for relation in db.apps().generic_relations(M::key()) {
            let related = db.apps().meta(relation.related)?;
            db.execute(
                &format!(
                    "DELETE FROM \"{}\" WHERE \"{}\" = ? AND \"{}\" = ?",
                    related.db_table, relation.content_type_column, relation.object_id_column
                ),
                &[Value::Int(relation.content_type_id), pk.clone()],
            )?;
        }

        let meta = M::meta();
        let (sql, params) = SqlCompiler::compile_delete(&meta.db_table, meta.pk_column(), &pk);
        db.execute(&sql, &params)?;
        tracing::debug!(model = %M::key(), pk = %pk, "deleted");

        send(db, &db.signals().post_delete, instance, false)
    })
}

/// Reloads an instance's fields from its row. Slots are kept.
///
/// # Errors
///
/// Returns [`EavError::DoesNotExist`] if the row is gone.
pub fn refresh_from_db<M: Model>(db: &Database, instance: &mut M) -> EavResult<()> {
    let meta = M::meta();
    let pk = instance
        .pk()
        .ok_or_else(|| EavError::DoesNotExist(format!("{} without a primary key", M::key())))?;
    let row = db.query_one(
        &format!(
            "SELECT * FROM \"{}\" WHERE \"{}\" = ?",
            meta.db_table,
            meta.pk_column()
        ),
        &[pk],
    )?;
    for (column, value) in row.iter() {
        instance.set_field(column, value)?;
    }
    Ok(())
}
