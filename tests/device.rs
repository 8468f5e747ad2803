mod common;

use common::{echo_function, init_tracing, plain, spawn_device, write_csv};
use shardev::cluster::ConfigError;
use shardev::device::{CallArg, CallError, ReturnArity};
use shardev::runtime::RuntimeError;
use shardev::tree::Tree;
use shardev::vm::{ElementType, FieldWidth, Function, Protocol, ValueMeta, Visibility};

fn secret_meta(data_len: u64) -> ValueMeta {
    ValueMeta {
        shape: vec![data_len],
        dtype: ElementType::U8,
        visibility: Visibility::Secret,
        protocol: Protocol::Semi2k,
        field: FieldWidth::Fm128,
        fraction_bits: 18,
    }
}

#[tokio::test]
async fn from_user_returns_one_object_per_output() {
    let _guard = init_tracing();
    let device = spawn_device(&["alice", "bob"]);
    let objects = device
        .call(
            echo_function("echo2", 2),
            vec![
                CallArg::Plain(Tree::Leaf(plain(&[1, 2, 3]))),
                CallArg::Plain(Tree::Leaf(plain(&[9]))),
            ],
            ReturnArity::FromUser(2),
        )
        .await
        .unwrap();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].meta(), &Tree::Leaf(secret_meta(3)));
    assert_eq!(objects[1].meta(), &Tree::Leaf(secret_meta(1)));

    // every party holds the same echoed share bytes
    let shares = device.outfeed_shares(&objects[1]).await.unwrap();
    assert_eq!(shares.len(), 2);
    let expected = bincode::serialize(&plain(&[9])).unwrap();
    for tree in shares {
        assert_eq!(tree, Tree::Leaf(expected.clone()));
    }
}

#[tokio::test]
async fn from_compiler_matches_the_program_outputs() {
    let device = spawn_device(&["alice", "bob"]);
    let objects = device
        .call(
            echo_function("echo3", 3),
            vec![CallArg::Plain(Tree::Leaf(plain(&[7])))],
            ReturnArity::FromCompiler,
        )
        .await
        .unwrap();
    assert_eq!(objects.len(), 3);
}

#[tokio::test]
async fn single_wraps_the_whole_output_tree_into_one_object() {
    let device = spawn_device(&["alice", "bob"]);
    let objects = device
        .call(
            echo_function("echo2", 2),
            vec![CallArg::Plain(Tree::Leaf(plain(&[4, 5])))],
            ReturnArity::Single,
        )
        .await
        .unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].leaf_count(), 2);
    assert_eq!(
        objects[0].meta(),
        &Tree::Node(vec![
            Tree::Leaf(secret_meta(2)),
            Tree::Leaf(secret_meta(2)),
        ])
    );
}

#[tokio::test]
async fn from_user_count_disagreement_fails_the_call() {
    let device = spawn_device(&["alice", "bob"]);
    let err = device
        .call(
            echo_function("echo2", 2),
            vec![CallArg::Plain(Tree::Leaf(plain(&[1])))],
            ReturnArity::FromUser(3),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::Runtime(RuntimeError::ArityMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[tokio::test]
async fn compile_failure_fails_the_whole_call() {
    let device = spawn_device(&["alice", "bob"]);
    let err = device
        .call(
            Function {
                name: "broken".into(),
                body: vec![],
            },
            vec![CallArg::Plain(Tree::Leaf(plain(&[1])))],
            ReturnArity::Single,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Compile(_)));
}

#[tokio::test]
async fn device_objects_can_feed_further_calls() {
    let device = spawn_device(&["alice", "bob"]);
    let first = device
        .call(
            echo_function("echo1", 1),
            vec![CallArg::Plain(Tree::Leaf(plain(&[42])))],
            ReturnArity::Single,
        )
        .await
        .unwrap();
    let second = device
        .call(
            echo_function("echo1", 1),
            vec![CallArg::Device(&first[0])],
            ReturnArity::Single,
        )
        .await
        .unwrap();
    let shares = device.outfeed_shares(&second[0]).await.unwrap();
    let expected = bincode::serialize(&plain(&[42])).unwrap();
    // the compiler wraps the single output into a one-leaf node
    assert_eq!(shares[0], Tree::Node(vec![Tree::Leaf(expected)]));
}

#[tokio::test]
async fn executables_must_consume_exactly_the_supplied_arguments() {
    use shardev::channel::SimpleChannel;
    use shardev::cluster::LinkConfig;
    use shardev::device::{Device, PartyParts};
    use shardev::transfer::TransferConfig;
    use shardev::vm::{ArgSpec, CompileError, CompileOutput, Compiler, Executable};

    // a compiler that loses the argument placeholders
    struct InputlessCompiler;

    impl Compiler for InputlessCompiler {
        fn compile(
            &self,
            function: &Function,
            _args: &[ArgSpec],
        ) -> Result<CompileOutput, CompileError> {
            Ok(CompileOutput {
                executable: Executable {
                    input_names: vec![],
                    output_names: vec!["out-0".into()],
                    program: function.body.clone(),
                },
                output_shape: Tree::Node(vec![Tree::Leaf(())]),
            })
        }
    }

    let links = SimpleChannel::channels_from_config(2, &LinkConfig::default());
    let parts = ["alice", "bob"]
        .iter()
        .zip(links)
        .map(|(name, link)| PartyParts {
            party: name.to_string(),
            link,
            vm: Box::new(common::MockVm),
            compiler: Box::new(InputlessCompiler),
            psi: Box::new(common::PlainPsi),
            pir: Box::new(common::FilePir),
        })
        .collect();
    let device = Device::spawn(
        common::descriptor(&["alice", "bob"]),
        TransferConfig::default(),
        parts,
    )
    .unwrap();

    let err = device
        .call(
            echo_function("echo1", 1),
            vec![CallArg::Plain(Tree::Leaf(plain(&[1])))],
            ReturnArity::FromCompiler,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::Runtime(RuntimeError::ArityMismatch {
            expected: 0,
            actual: 1
        })
    ));
}

#[tokio::test]
async fn release_is_idempotent_and_blocks_further_use() {
    let device = spawn_device(&["alice", "bob"]);
    let mut object = device
        .infeed_plain(Tree::Leaf(plain(&[1, 2])))
        .await
        .unwrap();
    let alias = object.clone();

    device.release(&mut object);
    device.release(&mut object);
    assert!(matches!(
        device.outfeed_shares(&object).await,
        Err(CallError::UseAfterRelease)
    ));
    assert!(matches!(
        device
            .call(
                echo_function("echo1", 1),
                vec![CallArg::Device(&object)],
                ReturnArity::Single,
            )
            .await,
        Err(CallError::UseAfterRelease)
    ));

    // the shares themselves are gone on the parties
    assert!(matches!(
        device.outfeed_shares(&alias).await,
        Err(CallError::Runtime(RuntimeError::NotFound(_)))
    ));
}

#[tokio::test]
async fn infeed_shares_round_trips_distinct_party_shares() {
    let device = spawn_device(&["alice", "bob"]);
    let meta = Tree::Leaf(secret_meta(2));
    let shares = vec![
        Tree::Leaf(vec![0xaa, 0x01]),
        Tree::Leaf(vec![0xbb, 0x02]),
    ];
    let object = device
        .infeed_shares(meta.clone(), shares.clone())
        .await
        .unwrap();
    assert_eq!(object.meta(), &meta);
    assert_eq!(device.outfeed_shares(&object).await.unwrap(), shares);
}

#[tokio::test]
async fn infeed_shares_rejects_mismatched_share_trees() {
    let device = spawn_device(&["alice", "bob"]);
    let meta = Tree::Leaf(secret_meta(1));
    // bob's tree has a different shape than the metadata
    let shares = vec![
        Tree::Leaf(vec![1]),
        Tree::Node(vec![Tree::Leaf(vec![1]), Tree::Leaf(vec![2])]),
    ];
    assert!(matches!(
        device.infeed_shares(meta, shares).await,
        Err(CallError::PartyDisagreement { expected: 1, actual: 2, .. })
    ));
}

#[tokio::test]
async fn dump_and_load_round_trip_through_party_records() {
    let device = spawn_device(&["alice", "bob"]);
    let object = device
        .infeed_plain(Tree::Node(vec![
            Tree::Leaf(plain(&[1])),
            Tree::Leaf(plain(&[2, 3])),
        ]))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let paths = vec![dir.path().join("alice.rec"), dir.path().join("bob.rec")];
    device.dump(&object, paths.clone()).await.unwrap();

    let loaded = device.load(paths).await.unwrap();
    assert_eq!(loaded.meta(), object.meta());
    assert_eq!(
        device.outfeed_shares(&loaded).await.unwrap(),
        device.outfeed_shares(&object).await.unwrap()
    );
}

#[tokio::test]
async fn dump_needs_one_path_per_party() {
    let device = spawn_device(&["alice", "bob"]);
    let object = device
        .infeed_plain(Tree::Leaf(plain(&[1])))
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let err = device
        .dump(&object, vec![dir.path().join("only-one.rec")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::Config(ConfigError::InvalidParameter { name, .. }) if name == "paths"
    ));
}

#[tokio::test]
async fn spawn_rejects_wrong_number_of_parts() {
    use shardev::channel::SimpleChannel;
    use shardev::device::{Device, PartyParts};
    use shardev::transfer::TransferConfig;

    let mut links = SimpleChannel::channels(2);
    let parts = vec![PartyParts {
        party: "alice".to_string(),
        link: links.remove(0),
        vm: Box::new(common::MockVm),
        compiler: Box::new(common::MockCompiler),
        psi: Box::new(common::PlainPsi),
        pir: Box::new(common::FilePir),
    }];
    assert!(matches!(
        Device::spawn(common::descriptor(&["alice", "bob"]), TransferConfig::default(), parts),
        Err(CallError::Config(ConfigError::InvalidParameter { name, .. })) if name == "parts"
    ));
}

#[tokio::test]
async fn psi_fan_out_needs_one_config_per_party() {
    let device = spawn_device(&["alice", "bob"]);
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.csv");
    write_csv(&input, &["id", "1"]).await;
    let config = shardev::psi::PsiConfig::new(
        vec!["id".into()],
        &input,
        dir.path().join("out.csv"),
        "alice",
    );
    let err = device.psi_csv(vec![config]).await.unwrap_err();
    assert!(matches!(
        err,
        CallError::Config(ConfigError::InvalidParameter { name, .. }) if name == "configs"
    ));
}
