//! Property tests for slug generation and attribute queries.

use eav_rs::models::Attribute;
use eav_rs::slug::{generate_slug, validate_slug};
use eav_rs::{Config, Datatype, EntityAccess, Registry};
use eav_rs_db::{kwargs, Lookup, ModelManager, Q};
use eav_rs_test::{Patient, TestDatabase};
use proptest::prelude::*;

const SLUG_MAX: usize = 50;

fn arb_ages() -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(prop::option::of(0_i64..100), 0..8)
}

fn arb_people() -> impl Strategy<Value = Vec<(Option<i64>, Option<i64>)>> {
    prop::collection::vec(
        (prop::option::of(0_i64..100), prop::option::of(0_i64..100)),
        0..8,
    )
}

/// A filter over the `age` and `weight` attributes.
#[derive(Debug, Clone)]
enum Cond {
    AgeBelow(i64),
    WeightAtLeast(i64),
    And(Vec<Cond>),
    Or(Vec<Cond>),
    Not(Box<Cond>),
}

impl Cond {
    fn to_q(&self) -> Q {
        match self {
            Self::AgeBelow(n) => Q::filter("eav__age", Lookup::Lt((*n).into())),
            Self::WeightAtLeast(n) => Q::filter("eav__weight", Lookup::Gte((*n).into())),
            Self::And(children) => Q::And(children.iter().map(Self::to_q).collect()),
            Self::Or(children) => Q::Or(children.iter().map(Self::to_q).collect()),
            Self::Not(inner) => Q::Not(Box::new(inner.to_q())),
        }
    }

    /// An unset attribute satisfies no leaf.
    fn eval(&self, age: Option<i64>, weight: Option<i64>) -> bool {
        match self {
            Self::AgeBelow(n) => age.is_some_and(|age| age < *n),
            Self::WeightAtLeast(n) => weight.is_some_and(|weight| weight >= *n),
            Self::And(children) => children.iter().all(|c| c.eval(age, weight)),
            Self::Or(children) => children.iter().any(|c| c.eval(age, weight)),
            Self::Not(inner) => !inner.eval(age, weight),
        }
    }
}

fn arb_leaf() -> impl Strategy<Value = Cond> {
    prop_oneof![
        (0_i64..100).prop_map(Cond::AgeBelow),
        (0_i64..100).prop_map(Cond::WeightAtLeast),
    ]
}

fn arb_cond() -> impl Strategy<Value = Cond> {
    arb_leaf().prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(Cond::And),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Cond::Or),
            inner.prop_map(|c| Cond::Not(Box::new(c))),
        ]
    })
}

/// Creates one patient per entry; `None` leaves the attribute unset.
fn populate(people: &[(Option<i64>, Option<i64>)]) -> (TestDatabase, Registry) {
    let db = TestDatabase::with_fixtures();
    eav_rs::install(&db).unwrap();
    let registry = Registry::new();
    registry.register::<Patient>(&db, Config::default().into_arc()).unwrap();
    Attribute::new("Age", Datatype::Int).create(&db).unwrap();
    Attribute::new("Weight", Datatype::Int).create(&db).unwrap();

    let manager = db.manager::<Patient>().unwrap();
    for (index, (age, weight)) in people.iter().enumerate() {
        let mut values = kwargs! { "name" => format!("p{index}") };
        if let Some(age) = age {
            values.extend(kwargs! { "eav__age" => *age });
        }
        if let Some(weight) = weight {
            values.extend(kwargs! { "eav__weight" => *weight });
        }
        manager.create(&db, &values).unwrap();
    }
    (db, registry)
}

fn ages_only(ages: &[Option<i64>]) -> Vec<(Option<i64>, Option<i64>)> {
    ages.iter().map(|age| (*age, None)).collect()
}

proptest! {
    #[test]
    fn generated_slugs_are_valid(name in "[ -~]{0,80}") {
        let slug = generate_slug(&name, SLUG_MAX);
        prop_assert!(slug.len() <= SLUG_MAX);
        prop_assert!(validate_slug(&slug, SLUG_MAX).is_ok(), "{:?} -> {:?}", name, slug);
    }

    #[test]
    fn unicode_slugs_are_valid(name in "\\PC{1,40}") {
        let slug = generate_slug(&name, SLUG_MAX);
        prop_assert!(validate_slug(&slug, SLUG_MAX).is_ok(), "{:?} -> {:?}", name, slug);
    }

    #[test]
    fn slugs_are_deterministic(name in "[a-zA-Z][a-zA-Z0-9 ]{0,30}") {
        prop_assert_eq!(generate_slug(&name, SLUG_MAX), generate_slug(&name, SLUG_MAX));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn filter_and_exclude_partition_the_entities(ages in arb_ages(), threshold in 0_i64..100) {
        let (db, _registry) = populate(&ages_only(&ages));
        let manager = db.manager::<Patient>().unwrap();
        let q = Q::filter("eav__age", Lookup::Lt(threshold.into()));

        let matched = manager.filter(q.clone()).count_exec(&db).unwrap();
        let excluded = manager.exclude(q).count_exec(&db).unwrap();
        let expected = ages.iter().flatten().filter(|age| **age < threshold).count();

        prop_assert_eq!(matched, expected);
        prop_assert_eq!(matched + excluded, ages.len());
    }

    #[test]
    fn nested_filters_match_an_in_memory_evaluation(people in arb_people(), cond in arb_cond()) {
        let (db, _registry) = populate(&people);
        let manager = db.manager::<Patient>().unwrap();
        let q = cond.to_q();

        let matched = manager.filter(q.clone()).count_exec(&db).unwrap();
        let excluded = manager.exclude(q).count_exec(&db).unwrap();
        let expected = people.iter().filter(|(age, weight)| cond.eval(*age, *weight)).count();

        prop_assert_eq!(matched, expected, "{:?}", cond);
        prop_assert_eq!(excluded, people.len() - expected, "{:?}", cond);
    }

    #[test]
    fn sibling_leaves_all_have_to_hold(
        people in arb_people(),
        leaves in prop::collection::vec(arb_leaf(), 2..5),
    ) {
        let (db, _registry) = populate(&people);
        let cond = Cond::And(leaves);
        let found = db
            .manager::<Patient>()
            .unwrap()
            .filter(cond.to_q())
            .execute_query(&db)
            .unwrap();

        let mut names: Vec<String> = found.into_iter().map(|patient| patient.name).collect();
        names.sort();
        let mut expected: Vec<String> = people
            .iter()
            .enumerate()
            .filter(|(_, (age, weight))| cond.eval(*age, *weight))
            .map(|(index, _)| format!("p{index}"))
            .collect();
        expected.sort();
        prop_assert_eq!(names, expected);
    }

    #[test]
    fn ordering_sorts_by_value_with_unset_first(ages in arb_ages()) {
        let (db, _registry) = populate(&ages_only(&ages));
        let ordered = db
            .manager::<Patient>()
            .unwrap()
            .all()
            .order_by(&["eav__age"])
            .execute_query(&db)
            .unwrap();
        prop_assert_eq!(ordered.len(), ages.len());

        let seen: Vec<Option<i64>> = ordered
            .iter()
            .map(|patient| patient.eav().unwrap().get(&db, "age").unwrap().as_int())
            .collect();
        let mut expected = ages.clone();
        expected.sort_unstable();
        prop_assert_eq!(seen, expected);
    }
}
