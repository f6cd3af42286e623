//! A version 14 person carried through every upgrade reads back as the same
//! person built directly in the current layout.

use gendb_codec::Value;
use gendb_core::codec::RawRecord;
use gendb_core::objects::{Citation, EventRef, Gender, Person, Tag};
use gendb_core::upgrade::run_upgrades;
use gendb_core::{Config, Handle, ObjectStore, ObjectType, CURRENT_SCHEMA_VERSION};
use proptest::prelude::*;

/// Everything a version 14 person tuple is built from.
#[derive(Debug, Clone)]
struct Seed {
    gramps_id: String,
    gender: i64,
    names: (String, String),
    events: Vec<String>,
    cities: Vec<(String, String)>,
    pages: Vec<String>,
    marker: (i64, String),
    change: i64,
    private: bool,
}

fn seed() -> impl Strategy<Value = Seed> {
    (
        "I[0-9]{4}",
        0i64..3,
        ("[A-Z][a-z]{0,8}", "[A-Z][a-z]{0,8}"),
        prop::collection::vec("e[a-z0-9]{3,8}", 0..4),
        prop::collection::vec(("[A-Z][a-z]{1,8}", "[A-Z]{2}"), 0..3),
        prop::collection::vec("p\\. [0-9]{1,3}", 0..3),
        (-1i64..4, "[A-Za-z]{0,6}"),
        0i64..2_000_000_000,
        any::<bool>(),
    )
        .prop_map(
            |(gramps_id, gender, names, events, cities, pages, marker, change, private)| Seed {
                gramps_id,
                gender,
                names,
                events,
                cities,
                pages,
                marker,
                change,
                private,
            },
        )
}

fn text(s: &str) -> Value {
    Value::from(s)
}

fn v14_tuple(seed: &Seed) -> Vec<Value> {
    let list = Value::Array;
    let empty = Value::empty_list;
    let events = seed
        .events
        .iter()
        .map(|e| {
            list(vec![
                Value::Bool(false),
                empty(),
                empty(),
                text(e),
                list(vec![Value::Integer(1), text("")]),
            ])
        })
        .collect();
    let addresses = seed
        .cities
        .iter()
        .map(|(city, country)| {
            let base = ["", city.as_str(), "", "", country.as_str(), "12345", ""];
            let base = base.map(text).to_vec();
            list(vec![Value::Bool(false), empty(), Value::Null, list(base)])
        })
        .collect();
    let sources = seed
        .pages
        .iter()
        .map(|page| {
            list(vec![
                Value::Null,
                Value::Bool(false),
                empty(),
                Value::Integer(2),
                text("s1"),
                text(page),
            ])
        })
        .collect();
    vec![
        text("p1"),
        text(&seed.gramps_id),
        Value::Integer(seed.gender),
        list(vec![text(&seed.names.0), text(&seed.names.1)]),
        empty(),
        list(events),
        empty(),
        empty(),
        empty(),
        list(addresses),
        empty(),
        empty(),
        list(sources),
        empty(),
        Value::Integer(seed.change),
        list(vec![Value::Integer(seed.marker.0), text(&seed.marker.1)]),
        Value::Bool(seed.private),
    ]
}

/// The person as this build would write it, minus the handles an upgrade
/// has to invent.
fn current_person(seed: &Seed) -> Person {
    let gender = match seed.gender {
        0 => Gender::Female,
        1 => Gender::Male,
        _ => Gender::Unknown,
    };
    let address_list = seed
        .cities
        .iter()
        .map(|(city, country)| {
            let base = ["", "", city.as_str(), "", "", country.as_str(), "12345", ""];
            let base = base.map(text).to_vec();
            Value::Array(vec![Value::Bool(false), Value::Null, Value::Array(base)])
        })
        .collect();
    Person {
        handle: Handle::new("p1"),
        gramps_id: seed.gramps_id.clone(),
        gender,
        primary_name: vec![text(&seed.names.0), text(&seed.names.1)],
        event_ref_list: seed
            .events
            .iter()
            .map(|e| EventRef::new(Handle::new(e.as_str())))
            .collect(),
        address_list,
        change: seed.change,
        private: seed.private,
        ..Person::default()
    }
}

fn expected_tag(marker: &(i64, String)) -> Option<&str> {
    let name = match marker.0 {
        1 => "Complete",
        2 => "ToDo",
        _ => marker.1.as_str(),
    };
    (!name.is_empty()).then_some(name)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn upgraded_person_matches_current_layout(seed in seed()) {
        let mut store = ObjectStore::open_in_memory(&Config::new()).unwrap();
        let raw = RawRecord::new(ObjectType::Person, 14, v14_tuple(&seed));
        store
            .batch_transaction("seed", |s, txn| s.commit_raw(&raw, txn).map(|_| ()))
            .unwrap();
        store.set_schema_version(14).unwrap();

        let report = run_upgrades(&mut store, 14).unwrap();
        prop_assert_eq!(report.to, CURRENT_SCHEMA_VERSION);

        let upgraded = store.get_person(&Handle::new("p1")).unwrap().unwrap();

        prop_assert_eq!(upgraded.citation_list.len(), seed.pages.len());
        for (handle, page) in upgraded.citation_list.iter().zip(&seed.pages) {
            let citation: Citation = store.get_object(handle).unwrap().unwrap();
            prop_assert_eq!(&citation.page, page);
            prop_assert_eq!(citation.source_handle, Some(Handle::new("s1")));
        }

        match expected_tag(&seed.marker) {
            Some(name) => {
                prop_assert_eq!(upgraded.tag_list.len(), 1);
                let tag: Tag = store.get_object(&upgraded.tag_list[0]).unwrap().unwrap();
                prop_assert_eq!(tag.name.as_str(), name);
            }
            None => prop_assert!(upgraded.tag_list.is_empty()),
        }

        let mut expected = current_person(&seed);
        expected.citation_list = upgraded.citation_list.clone();
        expected.tag_list = upgraded.tag_list.clone();
        prop_assert_eq!(upgraded, expected);
    }
}

#[test]
fn person_written_today_needs_no_upgrade() {
    let seed = Seed {
        gramps_id: "I0007".into(),
        gender: 1,
        names: ("Smith".into(), "John".into()),
        events: vec!["e1".into()],
        cities: vec![("Leeds".into(), "UK".into())],
        pages: Vec::new(),
        marker: (0, String::new()),
        change: 1_000,
        private: false,
    };
    let mut store = ObjectStore::open_in_memory(&Config::new()).unwrap();
    let person = current_person(&seed);
    let raw = gendb_core::objects::PrimaryObject::to_raw(&person);
    store
        .batch_transaction("seed", |s, txn| s.commit_raw(&raw, txn).map(|_| ()))
        .unwrap();
    assert_eq!(store.get_person(&Handle::new("p1")).unwrap().unwrap(), person);
}
