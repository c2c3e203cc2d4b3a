//! Persistence tests: model events hydrated into record stores and read back.

use std::sync::Arc;

use statemodel::core::events::EventBus;
use statemodel::core::manager::ModelManager;
use statemodel::core::model::{AbstractAction, AbstractState, AbstractStateModel};
use statemodel::core::selector::{SelectionAlgorithm, SelectorOptions};
use statemodel::core::sequence::SequenceInfo;
use statemodel::io::config::{PersistenceConfig, PersistenceMode};
use statemodel::io::persistence::hydrator::{
    AbstractActionHydrator, AbstractStateHydrator, Extractor, SequenceHydrator,
};
use statemodel::io::persistence::schema::{
    ABSTRACT_ACTION, ABSTRACT_STATE, SEQUENCE, SEQUENCE_STEP,
};
use statemodel::io::persistence::store::{JsonRecordStore, MemoryRecordStore, RecordStore};
use statemodel::io::persistence::{StorePersistence, persistence_from_config};
use statemodel::test_support::{command, screen, title_abstraction};

fn run_two_rooms(bus: EventBus) -> ModelManager {
    let model = AbstractStateModel::new("rooms", title_abstraction(), bus).into_shared();
    let options = SelectorOptions {
        seed: Some(1),
        ..SelectorOptions::default()
    };
    let mut manager = ModelManager::with_algorithm(model, SelectionAlgorithm::Unvisited, &options)
        .expect("manager");

    manager.notify_sequence_started().expect("start");
    let hall = vec![command("east")];
    manager
        .notify_new_state_reached(&screen("Hall"), &hall)
        .expect("hall");
    manager.notify_action_executed(&hall[0]).expect("east");
    let kitchen = vec![command("west")];
    manager
        .notify_new_state_reached(&screen("Kitchen"), &kitchen)
        .expect("kitchen");
    manager.notify_action_executed(&kitchen[0]).expect("west");
    manager
        .notify_new_state_reached(&screen("Hall"), &hall)
        .expect("hall again");
    manager.notify_sequence_stopped().expect("stop");
    manager.notify_testing_ended().expect("end");
    manager
}

#[test]
fn store_mirrors_the_model() {
    let persistence = Arc::new(StorePersistence::new(MemoryRecordStore::new()));
    let mut bus = EventBus::default();
    bus.subscribe(persistence.clone());
    let manager = run_two_rooms(bus);

    let model = manager.model();
    let model = model.read().expect("model");
    persistence.with_store(|store| {
        let states: Vec<AbstractState> = store
            .records(ABSTRACT_STATE)
            .into_iter()
            .map(|record| AbstractStateHydrator::default().extract(record).expect("state"))
            .collect();
        assert_eq!(states.len(), 2);
        for state in &states {
            assert_eq!(Some(state), model.state(&state.id).ok());
        }

        let actions: Vec<AbstractAction> = store
            .records(ABSTRACT_ACTION)
            .into_iter()
            .map(|record| AbstractActionHydrator::default().extract(record).expect("action"))
            .collect();
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|action| action.target.is_some()));

        let sequences: Vec<SequenceInfo> = store
            .records(SEQUENCE)
            .into_iter()
            .map(|record| SequenceHydrator::default().extract(record).expect("sequence"))
            .collect();
        assert_eq!(sequences.len(), 1);
        assert!(sequences[0].status.is_terminal());
        assert_eq!(sequences[0].step_count, 2);
        assert_eq!(store.records(SEQUENCE_STEP).len(), 2);
    });
    assert_eq!(persistence.stats().failed, 0);
}

#[test]
fn background_json_store_survives_reopen() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = PersistenceConfig {
        mode: PersistenceMode::Json,
        path: temp.path().join("model.json"),
        background: true,
    };
    let persistence = persistence_from_config(&config).expect("persistence");
    let mut bus = EventBus::default();
    bus.subscribe(persistence.listener());
    run_two_rooms(bus);

    let stats = persistence.stats();
    assert!(stats.written > 0);
    assert_eq!(stats.failed, 0);

    let store = JsonRecordStore::open(&config.path).expect("reopen");
    let counts = store.counts();
    assert_eq!(counts.get(ABSTRACT_STATE), Some(&2));
    assert_eq!(counts.get(ABSTRACT_ACTION), Some(&2));
    assert_eq!(counts.get(SEQUENCE), Some(&1));
}

#[test]
fn replaying_into_an_existing_store_adds_nothing_new() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = PersistenceConfig {
        mode: PersistenceMode::Json,
        path: temp.path().join("model.json"),
        background: false,
    };
    let count_after_run = || {
        let persistence = persistence_from_config(&config).expect("persistence");
        let mut bus = EventBus::default();
        bus.subscribe(persistence.listener());
        run_two_rooms(bus);
        JsonRecordStore::open(&config.path)
            .expect("reopen")
            .counts()
    };
    let first = count_after_run();
    let second = count_after_run();
    assert_eq!(first.get(ABSTRACT_STATE), second.get(ABSTRACT_STATE));
    assert_eq!(first.get(ABSTRACT_ACTION), second.get(ABSTRACT_ACTION));
    // Each run is its own sequence.
    assert_eq!(second.get(SEQUENCE), Some(&2));
}
