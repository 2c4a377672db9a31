// End-to-end sign → embed → validate → tamper loops over the in-memory
// assets from test_utils

#![cfg(feature = "test-utils")]

use c2pa_manifest::{
    assertions::{
        c2pa_action, Action, ActionsAssertion, Assertion, BmffExclusion, BmffHashAssertion,
        DataHashAssertion, IngredientAssertion, Relationship, ThumbnailAssertion,
    },
    hash_bytes,
    test_utils::{
        sample_image_bytes, test_signer_ed25519, test_signer_es256, MemoryAsset, MemoryBmffAsset,
    },
    AssetIo, AssetRef, BmffAssetIo, Claim, ClaimVersion, GeneratorInfo, HashAlgorithm, HashedUri,
    Manifest, ManifestStore, ManifestType, ValidationCode,
};

fn standard_manifest_v1() -> Manifest {
    let mut manifest = Manifest::new(ManifestType::Standard, Claim::generate_urn_v1());
    manifest.set_claim(Claim::new_v1(
        "xmp:iid:f7ba134b-8dec-4334-911d-a30409e32d8e",
        "image/jpeg",
        "test_app/1.0",
    ));
    manifest
}

fn signed_jpeg_store() -> (MemoryAsset, ManifestStore) {
    let mut asset = MemoryAsset::new(sample_image_bytes(2048));
    let signer = test_signer_es256();

    let mut manifest = standard_manifest_v1();
    let mut actions = ActionsAssertion::new(1);
    actions.add_action(Action::new(c2pa_action::CREATED));
    manifest.add_assertion(Assertion::Actions(actions)).unwrap();
    manifest
        .add_assertion(Assertion::DataHash(DataHashAssertion::new(
            HashAlgorithm::Sha256,
        )))
        .unwrap();

    let mut store = ManifestStore::new();
    store.push_manifest(manifest).unwrap();
    store.sign_and_embed(&mut asset, &signer).unwrap();
    (asset, store)
}

#[test]
fn test_sign_then_validate_jpeg() {
    let (asset, _) = signed_jpeg_store();

    // re-read everything from the asset bytes
    let store = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = store.validate(AssetRef::Data(&asset));

    assert!(report.is_valid(), "report: {:?}", report.entries());
    assert!(report.has_code(ValidationCode::ClaimSignatureValidated));
    assert!(report.has_code(ValidationCode::AssertionDataHashMatch));

    // every claimed assertion hash-verifies
    let matches = report
        .entries()
        .iter()
        .filter(|e| e.code == ValidationCode::AssertionHashedUriMatch)
        .count();
    assert_eq!(matches, 2);
}

#[test]
fn test_status_entries_follow_declaration_order() {
    let (asset, _) = signed_jpeg_store();
    let store = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = store.validate(AssetRef::Data(&asset));

    // signature first, then the claimed references in claim order
    assert_eq!(
        report.entries()[0].code,
        ValidationCode::ClaimSignatureValidated
    );
    let uri_entries: Vec<&str> = report
        .entries()
        .iter()
        .filter(|e| e.code == ValidationCode::AssertionHashedUriMatch)
        .filter_map(|e| e.url.as_deref())
        .collect();
    assert_eq!(
        uri_entries,
        vec![
            "self#jumbf=c2pa.assertions/c2pa.actions",
            "self#jumbf=c2pa.assertions/c2pa.hash.data",
        ]
    );
}

#[test]
fn test_tampered_content_fails_data_hash() {
    let (mut asset, _) = signed_jpeg_store();

    // flip a byte outside the manifest exclusion range
    let exclusion = asset.hash_exclusion_range().unwrap();
    asset.flip_byte(exclusion.end_offset() + 10);

    let store = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = store.validate(AssetRef::Data(&asset));
    assert!(!report.is_valid());
    assert!(report.has_code(ValidationCode::AssertionDataHashMismatch));
}

#[test]
fn test_tampered_assertion_fails_hashed_reference() {
    let (mut asset, _) = signed_jpeg_store();

    // flip one byte of the actions assertion inside the embedded JUMBF:
    // find the action string in the manifest region and corrupt it
    let needle = b"c2pa.created";
    let exclusion = asset.hash_exclusion_range().unwrap();
    let data = asset.data().to_vec();
    let position = data[exclusion.offset as usize..exclusion.end_offset() as usize]
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("action string embedded in manifest")
        + exclusion.offset as usize;
    // stay valid UTF-8 so the store still parses; only the digest changes
    asset.set_byte(position as u64 + 5, b'x');

    let store = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = store.validate(AssetRef::Data(&asset));
    assert!(!report.is_valid());
    assert!(report.has_code(ValidationCode::AssertionHashedUriMismatch));
    // guarded continuation: the asset is never touched after reference errors
    assert!(!report.has_code(ValidationCode::AssertionDataHashMatch));
}

#[test]
fn test_v2_claim_sign_and_validate() {
    let mut asset = MemoryAsset::new(sample_image_bytes(1024));
    let signer = test_signer_ed25519();

    let mut manifest = Manifest::new(
        ManifestType::Standard,
        Claim::generate_urn_v2(Some("test_app"), None),
    );
    manifest.set_claim(Claim::new_v2(
        "xmp:iid:1281cf29-ecd5-487a-a119-f5ed31ba2d78",
        GeneratorInfo::new("test_app", Some("1.0".to_string())),
    ));
    let mut actions = ActionsAssertion::new(2);
    actions.add_action(Action::new(c2pa_action::CREATED));
    manifest.add_assertion(Assertion::Actions(actions)).unwrap();
    manifest
        .add_assertion(Assertion::DataHash(DataHashAssertion::new(
            HashAlgorithm::Sha256,
        )))
        .unwrap();

    let mut store = ManifestStore::new();
    store.push_manifest(manifest).unwrap();
    store.sign_and_embed(&mut asset, &signer).unwrap();

    let parsed = ManifestStore::from_asset(&asset).unwrap().unwrap();
    assert_eq!(
        parsed.active_manifest().unwrap().claim().unwrap().version,
        ClaimVersion::V2
    );
    let report = parsed.validate(AssetRef::Data(&asset));
    assert!(report.is_valid(), "report: {:?}", report.entries());
}

#[test]
fn test_round_trip_is_byte_exact() {
    let (asset, _) = signed_jpeg_store();
    let jumbf = asset.manifest_jumbf().unwrap().unwrap();

    let store = ManifestStore::from_jumbf_bytes(&jumbf).unwrap();
    assert_eq!(store.to_jumbf_bytes().unwrap(), jumbf);
}

#[test]
fn test_update_manifest_validates_and_rejects_thumbnail() {
    let signer = test_signer_es256();

    let build = |with_thumbnail: bool| -> MemoryAsset {
        let mut asset = MemoryAsset::new(sample_image_bytes(512));
        let mut manifest = Manifest::new(ManifestType::Update, Claim::generate_urn_v1());
        manifest.set_claim(Claim::new_v1("xmp:iid:update", "image/jpeg", "app/1.0"));
        manifest
            .add_assertion(Assertion::Ingredient(IngredientAssertion::new(
                1,
                Relationship::ParentOf,
            )))
            .unwrap();
        if with_thumbnail {
            manifest
                .add_assertion(Assertion::Thumbnail(
                    ThumbnailAssertion::new_claim_thumbnail(
                        "jpeg",
                        "image/jpeg",
                        vec![0xFF, 0xD8, 0xFF, 0xD9],
                    ),
                ))
                .unwrap();
        }
        let mut store = ManifestStore::new();
        store.push_manifest(manifest).unwrap();
        store.sign_and_embed_update(&mut asset, &signer).unwrap();
        asset
    };

    let asset = build(false);
    let store = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = store.validate(AssetRef::Data(&asset));
    assert!(report.is_valid(), "report: {:?}", report.entries());
    assert!(report.has_code(ValidationCode::IngredientUnknownProvenance));

    let asset = build(true);
    let store = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = store.validate(AssetRef::Data(&asset));
    assert!(!report.is_valid());
    assert!(report.has_code(ValidationCode::ManifestUpdateInvalid));
}

/// Build a store whose active manifest references a prior manifest as a
/// parent ingredient, with correct manifest and claim-signature hashes
fn lineage_store(break_manifest_hash: bool) -> MemoryAsset {
    let signer = test_signer_es256();

    // parent manifest, signed standalone so its bytes are final
    let mut parent = Manifest::new(ManifestType::Standard, "urn:uuid:parent-0001".to_string());
    parent.set_claim(Claim::new_v1("xmp:iid:parent", "image/jpeg", "app/1.0"));
    parent
        .add_assertion(Assertion::DataHash(DataHashAssertion::new(
            HashAlgorithm::Sha256,
        )))
        .unwrap();
    parent.sign(&signer).unwrap();

    let parent_bytes = parent.bytes().unwrap();
    let mut parent_hash = hash_bytes(&parent_bytes, HashAlgorithm::Sha256);
    if break_manifest_hash {
        parent_hash[0] ^= 0xFF;
    }

    // active manifest with an ingredient pointing at the parent
    let mut asset = MemoryAsset::new(sample_image_bytes(1024));
    let mut active = standard_manifest_v1();
    let mut ingredient = IngredientAssertion::new(3, Relationship::ParentOf);
    ingredient.title = Some("parent.jpg".to_string());
    ingredient.active_manifest = Some(HashedUri::new(
        "self#jumbf=/c2pa/urn:uuid:parent-0001",
        None,
        parent_hash,
    ));
    ingredient.claim_signature = Some(HashedUri::new(
        "self#jumbf=/c2pa/urn:uuid:parent-0001/c2pa.signature",
        None,
        vec![0; 32],
    ));
    active
        .add_assertion(Assertion::Ingredient(ingredient))
        .unwrap();
    active
        .add_assertion(Assertion::DataHash(DataHashAssertion::new(
            HashAlgorithm::Sha256,
        )))
        .unwrap();

    let mut store = ManifestStore::new();
    store.push_manifest(parent).unwrap();
    store.push_manifest(active).unwrap();
    store.sign_and_embed(&mut asset, &signer).unwrap();
    asset
}

#[test]
fn test_ingredient_lineage_validates() {
    let asset = lineage_store(false);
    let store = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = store.validate(AssetRef::Data(&asset));

    assert!(report.is_valid(), "report: {:?}", report.entries());
    assert!(report.has_code(ValidationCode::IngredientManifestValidated));
    assert!(report.has_code(ValidationCode::IngredientClaimSignatureValidated));
}

#[test]
fn test_ingredient_manifest_hash_mismatch() {
    let asset = lineage_store(true);
    let store = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = store.validate(AssetRef::Data(&asset));

    assert!(!report.is_valid());
    assert!(report.has_code(ValidationCode::IngredientManifestMismatch));
}

#[test]
fn test_redaction_of_ingredient_manifest_assertion() {
    use c2pa_manifest::assertions::MetadataAssertion;

    let signer = test_signer_es256();

    // parent carries a metadata assertion that the next manifest redacts
    let mut parent = Manifest::new(ManifestType::Standard, "urn:uuid:parent-0002".to_string());
    parent.set_claim(Claim::new_v1("xmp:iid:parent2", "image/jpeg", "app/1.0"));
    parent
        .add_assertion(Assertion::Metadata(MetadataAssertion::new(
            "stds.exif",
            serde_json::json!({"exif:FNumber": 2.8}),
        )))
        .unwrap();
    parent
        .add_assertion(Assertion::DataHash(DataHashAssertion::new(
            HashAlgorithm::Sha256,
        )))
        .unwrap();
    parent.sign(&signer).unwrap();

    let exif_bytes = parent
        .component_bytes("self#jumbf=c2pa.assertions/stds.exif", true, None)
        .unwrap()
        .unwrap();
    let parent_hash = hash_bytes(&parent.bytes().unwrap(), HashAlgorithm::Sha256);

    let mut asset = MemoryAsset::new(sample_image_bytes(1024));
    let mut active = standard_manifest_v1();
    let mut ingredient = IngredientAssertion::new(1, Relationship::ParentOf);
    ingredient.active_manifest = Some(HashedUri::new(
        "self#jumbf=/c2pa/urn:uuid:parent-0002",
        None,
        parent_hash,
    ));
    active
        .add_assertion(Assertion::Ingredient(ingredient))
        .unwrap();
    active
        .add_assertion(Assertion::DataHash(DataHashAssertion::new(
            HashAlgorithm::Sha256,
        )))
        .unwrap();
    active.claim_mut().unwrap().redacted_assertions.push(HashedUri::new(
        "self#jumbf=/c2pa/urn:uuid:parent-0002/c2pa.assertions/stds.exif",
        None,
        hash_bytes(&exif_bytes, HashAlgorithm::Sha256),
    ));

    let mut store = ManifestStore::new();
    store.push_manifest(parent).unwrap();
    store.push_manifest(active).unwrap();
    store.sign_and_embed(&mut asset, &signer).unwrap();

    let parsed = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = parsed.validate(AssetRef::Data(&asset));
    assert!(report.is_valid(), "report: {:?}", report.entries());
    // the redaction target resolved and hash-verified
    let redaction_entry = report
        .entries()
        .iter()
        .find(|e| {
            e.url.as_deref()
                == Some("self#jumbf=/c2pa/urn:uuid:parent-0002/c2pa.assertions/stds.exif")
        })
        .expect("redaction entry present");
    assert_eq!(redaction_entry.code, ValidationCode::AssertionHashedUriMatch);
}

#[test]
fn test_self_redaction_rejected() {
    let mut asset = MemoryAsset::new(sample_image_bytes(512));
    let signer = test_signer_es256();

    let mut manifest = standard_manifest_v1();
    let data_hash_uri = manifest
        .add_assertion(Assertion::DataHash(DataHashAssertion::new(
            HashAlgorithm::Sha256,
        )))
        .unwrap();
    manifest.claim_mut().unwrap().redacted_assertions.push(HashedUri::new(
        data_hash_uri,
        None,
        vec![0; 32],
    ));

    let mut store = ManifestStore::new();
    store.push_manifest(manifest).unwrap();
    store.sign_and_embed(&mut asset, &signer).unwrap();

    let parsed = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = parsed.validate(AssetRef::Data(&asset));
    assert!(!report.is_valid());
    assert!(report.has_code(ValidationCode::AssertionSelfRedacted));
}

#[test]
fn test_v2_gathered_assertions_validate() {
    use c2pa_manifest::assertions::MetadataAssertion;

    let mut asset = MemoryAsset::new(sample_image_bytes(1024));
    let signer = test_signer_es256();

    let mut manifest = Manifest::new(
        ManifestType::Standard,
        Claim::generate_urn_v2(None, None),
    );
    manifest.set_claim(Claim::new_v2(
        "xmp:iid:gathered",
        GeneratorInfo::new("app", None),
    ));
    manifest
        .add_assertion(Assertion::DataHash(DataHashAssertion::new(
            HashAlgorithm::Sha256,
        )))
        .unwrap();

    // an externally sourced assertion: present in the store, gathered (not
    // created) by the claim
    let metadata = MetadataAssertion::new("cawg.metadata", serde_json::json!({"rating": 5}));
    let gathered_bytes = Assertion::Metadata(metadata.clone()).bytes().unwrap();
    manifest
        .assertion_store_mut()
        .push(Assertion::Metadata(metadata));
    manifest.claim_mut().unwrap().gathered_assertions.push(HashedUri::new(
        "self#jumbf=c2pa.assertions/cawg.metadata",
        None,
        hash_bytes(&gathered_bytes, HashAlgorithm::Sha256),
    ));

    let mut store = ManifestStore::new();
    store.push_manifest(manifest).unwrap();
    store.sign_and_embed(&mut asset, &signer).unwrap();

    let parsed = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = parsed.validate(AssetRef::Data(&asset));
    assert!(report.is_valid(), "report: {:?}", report.entries());
    assert!(report.has_code(ValidationCode::AssertionAccessible));
}

#[test]
fn test_bmff_sign_and_validate() {
    let mut asset = MemoryBmffAsset::sample_mp4(4096);
    let signer = test_signer_es256();

    let mut manifest = standard_manifest_v1();
    let mut bmff_hash = BmffHashAssertion::new(3, HashAlgorithm::Sha256).unwrap();
    bmff_hash.exclusions.push(BmffExclusion::new("/uuid"));
    manifest
        .add_assertion(Assertion::BmffHash(bmff_hash))
        .unwrap();

    let mut store = ManifestStore::new();
    store.push_manifest(manifest).unwrap();
    store.sign_and_embed_bmff(&mut asset, &signer).unwrap();

    let parsed = ManifestStore::from_asset(&asset).unwrap().unwrap();
    let report = parsed.validate(AssetRef::Bmff(&asset));
    assert!(report.is_valid(), "report: {:?}", report.entries());
    assert!(report.has_code(ValidationCode::AssertionBmffHashMatch));

    // tampering the media payload breaks the binding
    let mut tampered = asset.clone();
    tampered.tamper_mdat(100);
    let report = parsed.validate(AssetRef::Bmff(&tampered));
    assert!(!report.is_valid());
    assert!(report.has_code(ValidationCode::AssertionBmffHashMismatch));
}

#[test]
fn test_mp4_merkle_streaming_proofs() {
    use c2pa_manifest::{BlockSizing, MerkleTree, StreamingChunkHasher};

    let asset = MemoryBmffAsset::sample_mp4(1000);
    let mdat = asset
        .top_level_boxes()
        .unwrap()
        .into_iter()
        .find(|b| b.box_type == "mdat")
        .unwrap();
    let payload = asset
        .read_range(mdat.payload_offset, mdat.payload_size())
        .unwrap();

    // split the mdat payload into 64-byte chunks and build the tree
    let mut streamer = StreamingChunkHasher::new(HashAlgorithm::Sha256, BlockSizing::Fixed(64));
    streamer.update(&payload);
    let (tree, _) = streamer.into_tree().unwrap();
    let root = tree.root().unwrap().to_vec();

    let proof = tree.proof(0).unwrap();
    let chunk0 = &payload[..64];
    assert!(proof.verify(
        &hash_bytes(chunk0, HashAlgorithm::Sha256),
        &root,
        HashAlgorithm::Sha256
    ));

    // flip any byte in chunk 0 and the proof fails
    let mut tampered = chunk0.to_vec();
    tampered[17] ^= 0x01;
    assert!(!proof.verify(
        &hash_bytes(&tampered, HashAlgorithm::Sha256),
        &root,
        HashAlgorithm::Sha256
    ));

    // the same chunks through a plain tree give the same root
    let mut direct = MerkleTree::new(HashAlgorithm::Sha256);
    for chunk in payload.chunks(64) {
        direct.add_leaf(chunk).unwrap();
    }
    direct.build().unwrap();
    assert_eq!(direct.root().unwrap(), root.as_slice());
}
