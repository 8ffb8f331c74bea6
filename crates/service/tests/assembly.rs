use std::{env::temp_dir, fs, path::PathBuf, time::Duration};

use anyhow::Result;

use codec::{Endpoint, MAX_PAYLOAD, Packet, PacketKind};
use skymesh_service::Assembler;

fn scratch(test: &str) -> PathBuf {
    let dir = temp_dir().join(format!("skymesh-assembly-{}-{}", std::process::id(), test));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn origin() -> Endpoint {
    Endpoint::new("192.168.1.50".parse().unwrap(), 4050)
}

fn target() -> Endpoint {
    Endpoint::new("192.168.1.60".parse().unwrap(), 4060)
}

/// Splits `content` the way the sender does: fixed-width fragments, the
/// last one NUL padded by the packet constructor.
fn fragments(content: &[u8]) -> Vec<Packet> {
    let count = content.len().div_ceil(MAX_PAYLOAD) as u16;

    content
        .chunks(MAX_PAYLOAD)
        .enumerate()
        .map(|(index, chunk)| {
            let mut packet = Packet::new(origin(), target(), PacketKind::File, chunk).unwrap();
            packet.fragment_number = index as u16 + 1;
            packet.fragment_count = count;
            packet.seal();
            packet
        })
        .collect()
}

/// 2.5 fragments of patterned, non-NUL-terminated content.
fn sample_content() -> Vec<u8> {
    let mut content: Vec<u8> = (0..MAX_PAYLOAD * 2 + MAX_PAYLOAD / 2)
        .map(|i| (i % 251) as u8)
        .collect();
    *content.last_mut().unwrap() = 0xFF;
    content
}

#[test]
fn ordered_delivery_reproduces_the_file() -> Result<()> {
    let mut assembler = Assembler::new(scratch("ordered"))?;
    let content = sample_content();

    let packets = fragments(&content);
    assert_eq!(packets.len(), 3);

    assert_eq!(assembler.accept(&packets[0])?, None);
    assert_eq!(assembler.accept(&packets[1])?, None);

    let path = assembler.accept(&packets[2])?.expect("transfer complete");
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        format!("final_{}_{}", u32::from(origin().address), origin().port)
    );
    assert_eq!(fs::read(&path)?, content);
    assert_eq!(assembler.pending_transfers(), 0);

    Ok(())
}

#[test]
fn out_of_order_delivery_still_reassembles_in_fragment_order() -> Result<()> {
    let mut assembler = Assembler::new(scratch("unordered"))?;
    let content = sample_content();

    let packets = fragments(&content);
    assert_eq!(assembler.accept(&packets[2])?, None);
    assert_eq!(assembler.accept(&packets[0])?, None);

    let path = assembler.accept(&packets[1])?.expect("transfer complete");
    assert_eq!(fs::read(&path)?, content);

    Ok(())
}

#[test]
fn missing_fragments_never_produce_a_final_artefact() -> Result<()> {
    let dir = scratch("missing");
    let mut assembler = Assembler::new(dir.clone())?;

    let packets = fragments(&sample_content());
    assert_eq!(assembler.accept(&packets[0])?, None);
    assert_eq!(assembler.accept(&packets[2])?, None);

    assert_eq!(assembler.pending_transfers(), 1);
    assert!(
        !dir.join(format!(
            "final_{}_{}",
            u32::from(origin().address),
            origin().port
        ))
        .exists()
    );

    Ok(())
}

#[test]
fn duplicate_fragments_do_not_complete_a_transfer() -> Result<()> {
    let mut assembler = Assembler::new(scratch("duplicate"))?;

    let packets = fragments(&sample_content());
    assert_eq!(assembler.accept(&packets[0])?, None);
    assert_eq!(assembler.accept(&packets[0])?, None);
    assert_eq!(assembler.accept(&packets[0])?, None);

    assert_eq!(assembler.pending_transfers(), 1);

    Ok(())
}

#[test]
fn scratch_artefacts_are_removed_after_completion() -> Result<()> {
    let dir = scratch("cleanup");
    let mut assembler = Assembler::new(dir.clone())?;

    let packets = fragments(&sample_content());
    for packet in &packets[..2] {
        assembler.accept(packet)?;
    }

    let prefix = format!("{}_{}_", u32::from(origin().address), origin().port);
    let count_fragments = || -> usize {
        fs::read_dir(&dir)
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_str()
                    .unwrap()
                    .starts_with(&prefix)
            })
            .count()
    };

    assert_eq!(count_fragments(), 2);

    assembler.accept(&packets[2])?.expect("transfer complete");
    assert_eq!(count_fragments(), 0);

    Ok(())
}

#[test]
fn single_fragment_files_lose_only_their_padding() -> Result<()> {
    let mut assembler = Assembler::new(scratch("single"))?;

    let content = b"short file with a definite end\xFF".to_vec();
    let packets = fragments(&content);
    assert_eq!(packets.len(), 1);

    let path = assembler.accept(&packets[0])?.expect("transfer complete");
    assert_eq!(fs::read(&path)?, content);

    Ok(())
}

#[test]
fn purge_reaps_idle_transfers_and_their_artefacts() -> Result<()> {
    let dir = scratch("purge");
    let mut assembler = Assembler::new(dir.clone())?;

    let packets = fragments(&sample_content());
    assembler.accept(&packets[0])?;
    assert_eq!(assembler.pending_transfers(), 1);

    // A generous deadline keeps the transfer alive.
    assembler.purge(Duration::from_secs(600));
    assert_eq!(assembler.pending_transfers(), 1);

    // A zero deadline reaps it, scratch file included.
    assembler.purge(Duration::ZERO);
    assert_eq!(assembler.pending_transfers(), 0);

    let fragment = dir.join(format!(
        "{}_{}_1",
        u32::from(origin().address),
        origin().port
    ));
    assert!(!fragment.exists());

    Ok(())
}

#[test]
fn transfers_from_different_origins_do_not_interfere() -> Result<()> {
    let mut assembler = Assembler::new(scratch("origins"))?;

    let content = sample_content();
    let packets = fragments(&content);

    let other = Endpoint::new("192.168.1.51".parse().unwrap(), 4051);
    let mut foreign = packets[0].clone();
    foreign.source = other;
    foreign.seal();

    assert_eq!(assembler.accept(&packets[0])?, None);
    assert_eq!(assembler.accept(&foreign)?, None);
    assert_eq!(assembler.accept(&packets[1])?, None);
    assert_eq!(assembler.pending_transfers(), 2);

    let path = assembler.accept(&packets[2])?.expect("transfer complete");
    assert_eq!(fs::read(&path)?, content);
    assert_eq!(assembler.pending_transfers(), 1);

    Ok(())
}
