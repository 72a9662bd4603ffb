//! Strata Runtime
//!
//! Small driver that boots a database, populates it and walks a few queries.
//! Usage: `strata [config.json]`

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use strata_db::{
    define_component, spawn, ComponentQuery, ComponentType, Composition, Database, DatabaseConfig,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct Health {
    value: i32,
}

define_component!(Position, "Position");
define_component!(Velocity, "Velocity");
define_component!(Health, "Health");

fn load_config() -> Result<DatabaseConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(DatabaseConfig::default());
    };
    let json = std::fs::read_to_string(&path).with_context(|| format!("reading config {path}"))?;
    let config = DatabaseConfig::from_json_str(&json).with_context(|| format!("parsing config {path}"))?;
    tracing::info!(%path, "loaded config");
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Strata v{}", strata_db::VERSION);

    let mut db = Database::with_config(load_config()?);
    db.initialize_with_config(&[
        ComponentType::of::<Position>(),
        ComponentType::of::<Velocity>(),
        ComponentType::of::<Health>(),
    ])?;

    let movers = Composition::new()
        .with(Position::default())
        .with(Velocity { x: 1.0, y: 0.0, z: 0.5 });
    let mut spawned = db.add_entities(&movers, 1_000);
    let mut ids = Vec::with_capacity(spawned.total_entities());
    while spawned.next() {
        ids.extend_from_slice(spawned.entities(&db));
    }
    db.add_entities(&Composition::new().with(Position::default()), 250);
    spawn!(db, Health { value: 100 });

    // Integrate velocities once.
    let mut moving = ComponentQuery::new().with::<Position>().with::<Velocity>();
    let mut it = db.run_query(&mut moving);
    while it.next() {
        let velocities = it.column::<Velocity>(&db).to_vec();
        for (position, velocity) in it.column_mut::<Position>(&mut db).iter_mut().zip(&velocities) {
            position.x += velocity.x;
            position.y += velocity.y;
            position.z += velocity.z;
        }
    }

    // Give the first hundred movers health, then drop the next hundred.
    let (healed, rest) = ids.split_at(ids.len().min(100));
    db.update_entities(healed, &Composition::new().with(Health { value: 50 }), &[]);
    db.remove_entities(&rest[..rest.len().min(100)]);

    let mut living = ComponentQuery::new().with::<Health>();
    let mut it = db.run_query(&mut living);
    let mut total_health = 0i64;
    while it.next() {
        total_health += it.column::<Health>(&db).iter().map(|h| i64::from(h.value)).sum::<i64>();
    }

    tracing::info!(
        entities = db.entity_count(),
        archetypes = db.archetype_count(),
        total_health,
        "database populated"
    );
    tracing::info!(
        created = db.stats().entities_created(),
        destroyed = db.stats().entities_destroyed(),
        live_blobs = db.stats().live_blobs(),
        "storage stats"
    );

    Ok(())
}
