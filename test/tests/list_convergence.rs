/// Property tests: random edits on either side leave both lists equal

use proptest::prelude::*;

use rd_shared::RdList;
use rd_test::TestEndpoints;

#[derive(Debug, Clone)]
enum Edit {
    Add(i32),
    Insert(usize, i32),
    Set(usize, i32),
    RemoveAt(usize),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => any::<i32>().prop_map(Edit::Add),
        2 => (any::<usize>(), any::<i32>()).prop_map(|(index, value)| Edit::Insert(index, value)),
        2 => (any::<usize>(), any::<i32>()).prop_map(|(index, value)| Edit::Set(index, value)),
        2 => any::<usize>().prop_map(Edit::RemoveAt),
    ]
}

fn apply(list: &RdList<i32>, edit: &Edit) {
    let len = list.len();
    match *edit {
        Edit::Add(value) => list.add(value),
        Edit::Insert(index, value) => list.insert(index % (len + 1), value),
        Edit::Set(index, value) if len > 0 => {
            list.set(index % len, value);
        }
        Edit::RemoveAt(index) if len > 0 => {
            list.remove_at(index % len);
        }
        _ => {}
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn alternating_sides_converge(
        batches in proptest::collection::vec(
            (any::<bool>(), proptest::collection::vec(edit(), 1..8)),
            1..10,
        ),
    ) {
        let endpoints = TestEndpoints::new();
        let client = RdList::<i32>::new();
        let server = RdList::<i32>::new();
        endpoints.bind(&client, &server, "numbers");
        endpoints.exchange();

        for (on_client, edits) in &batches {
            let (peer, list) = if *on_client {
                (&endpoints.client, &client)
            } else {
                (&endpoints.server, &server)
            };
            peer.run(|| {
                for edit in edits {
                    apply(list, edit);
                }
            });
            endpoints.exchange();
            prop_assert_eq!(client.to_vec(), server.to_vec());
        }
    }
}
