use shardev::channel::SimpleChannel;
use shardev::transfer::{DEFAULT_CHUNK_LEN, TransferConfig, exchange_files};

fn csv_of(rows: usize, tag: &str) -> String {
    let mut content = String::from("id,tag,score\n");
    for i in 0..rows {
        content.push_str(&format!("{i},{tag},{}\n", i * 3));
    }
    content
}

#[tokio::test]
async fn duplex_exchange_moves_files_larger_than_one_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let src0 = dir.path().join("alice-send.csv");
    let src1 = dir.path().join("bob-send.csv");
    let dst0 = dir.path().join("alice-recv.csv");
    let dst1 = dir.path().join("bob-recv.csv");

    // both files span many chunks
    let content0 = csv_of(50_000, "alice");
    let content1 = csv_of(60_000, "bob");
    assert!(content0.len() > 10 * DEFAULT_CHUNK_LEN);
    tokio::fs::write(&src0, &content0).await.unwrap();
    tokio::fs::write(&src1, &content1).await.unwrap();

    let mut channels = SimpleChannel::channels(2);
    let mut ch1 = channels.pop().unwrap();
    let mut ch0 = channels.pop().unwrap();
    let config = TransferConfig::default();

    let (res0, res1) = tokio::join!(
        exchange_files(&mut ch0, 0, 1, &src0, &dst0, &config),
        exchange_files(&mut ch1, 1, 0, &src1, &dst1, &config),
    );
    let (sent0, received0) = res0.unwrap();
    let (sent1, received1) = res1.unwrap();
    assert_eq!(sent0, content0.len() as u64);
    assert_eq!(received0, content1.len() as u64);
    assert_eq!(sent1, content1.len() as u64);
    assert_eq!(received1, content0.len() as u64);

    // byte-identical in both directions
    assert_eq!(tokio::fs::read_to_string(&dst0).await.unwrap(), content1);
    assert_eq!(tokio::fs::read_to_string(&dst1).await.unwrap(), content0);
}

#[tokio::test]
async fn empty_files_exchange_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let src0 = dir.path().join("empty0");
    let src1 = dir.path().join("empty1");
    let dst0 = dir.path().join("recv0");
    let dst1 = dir.path().join("recv1");
    tokio::fs::write(&src0, b"").await.unwrap();
    tokio::fs::write(&src1, b"").await.unwrap();

    let mut channels = SimpleChannel::channels(2);
    let mut ch1 = channels.pop().unwrap();
    let mut ch0 = channels.pop().unwrap();
    let config = TransferConfig {
        max_chunk_len: 16,
    };

    let (res0, res1) = tokio::join!(
        exchange_files(&mut ch0, 0, 1, &src0, &dst0, &config),
        exchange_files(&mut ch1, 1, 0, &src1, &dst1, &config),
    );
    assert_eq!(res0.unwrap(), (0, 0));
    assert_eq!(res1.unwrap(), (0, 0));
    assert!(tokio::fs::read(&dst0).await.unwrap().is_empty());
}
