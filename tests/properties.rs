mod common;

use common::NS;
use opentdf_split::prelude::*;
use opentdf_split::split;
use proptest::prelude::*;

fn dek_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 16..=64)
}

/// Three anyOf countries, two allOf compartments and one ungranted value
fn graph() -> AttributeGraph {
    let mut g = AttributeGraph::new();
    g.add_namespace(NS, vec![]).unwrap();
    g.add_attribute(&format!("{NS}/attr/rel"), AttributeRule::AnyOf, vec![])
        .unwrap();
    for country in ["aus", "can", "usa"] {
        g.add_value(
            &format!("{NS}/attr/rel/value/{country}"),
            vec![KeyAccessServer::unresolved(format!("https://kas.{country}"))],
        )
        .unwrap();
    }
    g.add_attribute(
        &format!("{NS}/attr/needtoknow"),
        AttributeRule::AllOf,
        vec![KeyAccessServer::unresolved("https://kas.ntk")],
    )
    .unwrap();
    for topic in ["inf", "sec"] {
        g.add_value(&format!("{NS}/attr/needtoknow/value/{topic}"), vec![])
            .unwrap();
    }
    g.add_attribute(&format!("{NS}/attr/level"), AttributeRule::Hierarchy, vec![])
        .unwrap();
    g.add_value(&format!("{NS}/attr/level/value/low"), vec![]).unwrap();
    g
}

fn fqns() -> Vec<String> {
    [
        "rel/value/aus",
        "rel/value/can",
        "rel/value/usa",
        "needtoknow/value/inf",
        "needtoknow/value/sec",
        "level/value/low",
    ]
    .iter()
    .map(|v| format!("{NS}/attr/{v}"))
    .collect()
}

proptest! {
    #[test]
    fn test_split_merge_recovers_key(dek in dek_strategy(), n in 1usize..=8) {
        let shares = split::split(&dek, n).unwrap();
        prop_assert_eq!(shares.len(), n);
        prop_assert!(shares.iter().all(|s| s.len() == dek.len()));
        let merged = split::merge(&shares).unwrap();
        prop_assert_eq!(merged.as_slice(), dek.as_slice());
    }

    #[test]
    fn test_proper_subsets_hide_key(dek in dek_strategy(), n in 2usize..=5) {
        let shares = split::split(&dek, n).unwrap();
        // every non-empty subset except the full set
        for mask in 1u32..(1 << n) - 1 {
            let subset: Vec<&KeyShare> = shares
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| s)
                .collect();
            let partial = split::merge(&subset).unwrap();
            prop_assert_ne!(partial.as_slice(), dek.as_slice(), "subset mask {:b}", mask);
        }
    }

    #[test]
    fn test_plan_ignores_value_order(order in Just(fqns()).prop_shuffle(), take in 1usize..=6) {
        let g = graph();
        let mut subset: Vec<String> = order.into_iter().take(take).collect();
        let shuffled = plan(&g.values(&subset).unwrap());
        subset.sort();
        let sorted = plan(&g.values(&subset).unwrap());
        prop_assert_eq!(&shuffled, &sorted);

        let ids = shuffled.split_ids();
        for (i, sid) in ids.iter().enumerate() {
            prop_assert_eq!(sid.to_string(), format!("s{}", i + 1));
        }
    }
}
