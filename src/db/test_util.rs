use chrono::{DateTime, Utc};
use diesel_async::{
    AsyncPgConnection,
    pooled_connection::{
        AsyncDieselConnectionManager,
        deadpool::{Object, Pool},
    },
};
use rand::seq::IndexedRandom;
use rstest::fixture;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::{
    db::model::{
        FetchByQuery, Write,
        experiment::{Experiment, NewExperiment},
        phenotyper::{NewPhenotyper, Phenotyper, PhenotyperQuery},
        scan::NewScan,
        scientist::{NewScientist, Scientist, ScientistQuery},
    },
    server::{run_migrations, util::DevPostgres},
};

pub const N_SCIENTISTS: usize = 10;
pub const N_PHENOTYPERS: usize = 8;
pub const N_EXPERIMENTS: usize = 5;

struct TestState {
    _container: DevPostgres,
    db_pool: Pool<AsyncPgConnection>,
}

impl TestState {
    async fn new() -> Self {
        let container = DevPostgres::new("bloom-backend_unit_test").await.unwrap();

        let db_config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(
            container.db_url().await.unwrap(),
        );
        let db_pool = Pool::builder(db_config).build().unwrap();

        let test_state = Self {
            _container: container,
            db_pool,
        };

        test_state.populate_db().await;

        test_state
    }

    async fn populate_db(&self) {
        let db_conn = self.db_pool.get().await.unwrap();
        run_migrations(db_conn).await.unwrap();

        let db_conn = &mut self.db_pool.get().await.unwrap();

        let mut scientists = Vec::with_capacity(N_SCIENTISTS);
        for i in 0..N_SCIENTISTS {
            let scientist = NewScientist {
                name: format!("scientist{i}"),
                email: format!("scientist{i}@example.org"),
            }
            .write(db_conn)
            .await
            .unwrap();

            scientists.push(scientist);
        }

        for i in 0..N_PHENOTYPERS {
            NewPhenotyper {
                name: format!("phenotyper{i}"),
                email: format!("phenotyper{i}@example.org"),
            }
            .write(db_conn)
            .await
            .unwrap();
        }

        let rng = &mut rand::rng();
        for i in 0..N_EXPERIMENTS {
            let scientist_id = scientists.choose(rng).unwrap().id;

            NewExperiment {
                name: format!("experiment{i}"),
                species: "Zea mays".to_string(),
                scientist_id,
                accession_id: None,
            }
            .write(db_conn)
            .await
            .unwrap();
        }
    }
}

static TEST_STATE: OnceCell<TestState> = OnceCell::const_new();
pub type DbConnection = Object<AsyncPgConnection>;

#[fixture]
pub async fn db_conn() -> DbConnection {
    let test_state = TEST_STATE.get_or_init(TestState::new).await;

    test_state.db_pool.get().await.unwrap()
}

/// A fresh experiment owned by the caller's transaction, so concurrent tests
/// never contend on the same row.
pub async fn some_experiment(db_conn: &mut AsyncPgConnection) -> Experiment {
    let scientist = Scientist::fetch_by_query(&ScientistQuery::default(), db_conn)
        .await
        .unwrap()
        .remove(0);

    NewExperiment {
        name: format!("experiment-{}", Uuid::now_v7()),
        species: "Zea mays".to_string(),
        scientist_id: scientist.id,
        accession_id: None,
    }
    .write(db_conn)
    .await
    .unwrap()
}

pub async fn some_phenotyper(db_conn: &mut AsyncPgConnection) -> Phenotyper {
    Phenotyper::fetch_by_query(&PhenotyperQuery::default(), db_conn)
        .await
        .unwrap()
        .remove(0)
}

pub fn new_scan(
    plant_barcode: &str,
    experiment: &Experiment,
    phenotyper: &Phenotyper,
    captured_at: DateTime<Utc>,
) -> NewScan {
    NewScan {
        plant_barcode: plant_barcode.to_string(),
        experiment_id: experiment.id,
        phenotyper_id: phenotyper.id,
        captured_at,
        exposure_time: 1200.0,
        gain: 2.5,
        gamma: 1.0,
        num_frames: 72,
        seconds_per_rot: 36.0,
        capture_path: format!("./scans/{plant_barcode}"),
    }
}
