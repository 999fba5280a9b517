//! Basic usage example for OTS timestamp proofs
//!
//! This example demonstrates, entirely offline:
//! - Aggregating several digests under one Merkle commitment
//! - Reconstructing each file's proof from its operation chain
//! - Serializing proofs and merging independent ones
//!
//! Run with: cargo run --example basic_usage

use ots_core::{
    replay_chain, Attestation, DetachedTimestampFile, MerkleTree, Op, Timestamp,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("OTS Timestamp Proof Example");
    println!("===========================\n");

    // Step 1: Some documents to timestamp
    let documents: [&[u8]; 3] = [
        b"Hello, world!",
        b"Timestamp this document",
        b"Another piece of data",
    ];

    let mut detached = Vec::new();
    println!("File digests (sha256):");
    for (i, data) in documents.iter().enumerate() {
        let file = DetachedTimestampFile::from_data(Op::Sha256, data)?;
        println!("  {}. {}", i + 1, hex::encode(file.file_digest()));
        detached.push(file);
    }
    println!();

    // Step 2: Aggregate the digests under one Merkle root
    let leaves: Vec<Vec<u8>> = detached
        .iter()
        .map(|file| file.file_digest().to_vec())
        .collect();
    let tree = MerkleTree::build(leaves)?;

    println!("Aggregate commitment:");
    println!("  Leaves: {}", tree.len());
    println!("  Root:   {}", hex::encode(tree.root()));
    println!();

    // Step 3: Pretend a calendar anchored the root into Bitcoin.
    // In a real run, OtsClient::stamp submits the root and merges the
    // calendar's response here.
    let mut anchor = Timestamp::new(tree.root().to_vec());
    anchor.attest(Attestation::Pending {
        uri: "https://alice.btc.calendar.opentimestamps.org".to_string(),
    });
    anchor
        .add(Op::Sha256)
        .attest(Attestation::Bitcoin { height: 812_386 });

    // Step 4: Rebuild each file's individual proof from its chain
    for (i, file) in detached.iter_mut().enumerate() {
        let proof = replay_chain(
            file.file_digest().to_vec(),
            tree.chain(i),
            anchor.clone(),
        )?;
        file.timestamp.merge(proof)?;

        println!("Proof for file {}:", i + 1);
        println!("  Chain length: {} operations", tree.chain(i).len());
        println!("  Complete:     {}", file.timestamp.is_complete());

        let bytes = file.serialize_to_vec();
        println!("  Serialized:   {} bytes", bytes.len());

        // Round-trip through the wire format
        let parsed = DetachedTimestampFile::from_bytes(&bytes)?;
        assert_eq!(parsed, *file, "round-trip must preserve the proof");
        println!("  Round-trip OK");
        println!();
    }

    // Step 5: Show one proof tree in full
    println!("Proof tree for file 1:");
    print!("{}", detached[0].info());
    println!();

    println!("In a real system:");
    println!("  1. `ots stamp` submits the root to public calendars");
    println!("  2. `ots upgrade` later replaces pending claims with block headers");
    println!("  3. `ots verify` checks the digest against a Bitcoin node's headers");

    Ok(())
}
