//! The process-wide engine. Kept in its own test binary so the singleton
//! starts out empty.

mod common;

use std::sync::Barrier;

use common::MockDriver;
use transwarp::{
    DbContext, Engine, EngineConfig, EngineErrorKind, Result, Value, create_engine,
    global_engine, has_engine, init_engine,
};
use transwarp_sqlite::SqliteConnector;

#[test]
fn engine_is_initialized_exactly_once() {
    assert!(!has_engine());
    let err = global_engine().unwrap_err();
    assert!(err.is_engine(EngineErrorKind::NotInitialized));
    let err = DbContext::from_global().unwrap_err();
    assert!(err.is_engine(EngineErrorKind::NotInitialized));

    let barrier = Barrier::new(4);
    let winners: Vec<Engine> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    create_engine(
                        EngineConfig::new()
                            .driver("sqlite")
                            .database(":memory:")
                            .password("never-logged"),
                        SqliteConnector,
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| match h.join().expect("racer panicked") {
                Ok(engine) => Some(engine),
                Err(err) => {
                    assert!(err.is_engine(EngineErrorKind::AlreadyInitialized));
                    None
                }
            })
            .collect()
    });
    assert_eq!(winners.len(), 1, "exactly one initializer wins the race");
    assert!(has_engine());
    assert_eq!(winners[0].driver_name(), "sqlite");

    let err = create_engine(EngineConfig::new(), SqliteConnector).unwrap_err();
    assert!(err.is_engine(EngineErrorKind::AlreadyInitialized));

    let err = init_engine(MockDriver::new().engine()).unwrap_err();
    assert!(err.is_engine(EngineErrorKind::AlreadyInitialized));

    assert_eq!(global_engine().expect("engine").driver_name(), "sqlite");

    // An in-memory database lives as long as its connection, so keep
    // everything inside one connection scope.
    let mut ctx = DbContext::from_global().expect("context");
    let count = ctx
        .with_connection(|ctx| -> Result<Option<i64>> {
            ctx.update("CREATE TABLE hits (id INTEGER PRIMARY KEY)", &[])?;
            ctx.with_transaction(|ctx| -> Result<()> {
                ctx.update("INSERT INTO hits DEFAULT VALUES", &[])?;
                ctx.with_transaction(|ctx| ctx.update("INSERT INTO hits DEFAULT VALUES", &[]))?;
                Ok(())
            })?;
            let row = ctx.select_one("SELECT COUNT(*) FROM hits", &[])?;
            Ok(row.and_then(|r| r.get(0).and_then(Value::as_i64)))
        })
        .expect("round trip through the global engine");
    assert_eq!(count, Some(2));
    assert!(!ctx.is_init());
}
