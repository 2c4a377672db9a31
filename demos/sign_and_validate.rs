/// Sign-and-validate walkthrough
///
/// Builds a manifest with an edit history and a DataHash hard binding,
/// signs it into an in-memory asset, then re-reads and validates it,
/// and finally demonstrates tamper detection.
///
/// Run with: cargo run --example sign_and_validate
use c2pa_manifest::{
    assertions::{c2pa_action, Action, ActionsAssertion, Assertion, DataHashAssertion},
    test_utils::{sample_image_bytes, test_signer_es256, MemoryAsset},
    AssetIo, AssetRef, Claim, HashAlgorithm, Manifest, ManifestStore, ManifestType,
};

fn main() -> c2pa_manifest::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("🔏 C2PA manifest sign & validate");
    println!("================================\n");

    // A stand-in for a JPEG: 4 KiB of content with a manifest insertion point
    let mut asset = MemoryAsset::new(sample_image_bytes(4096));
    let signer = test_signer_es256();

    // Build the manifest: claim, edit history, hard binding
    let mut manifest = Manifest::new(ManifestType::Standard, Claim::generate_urn_v1());
    manifest.set_claim(Claim::new_v1(
        "xmp:iid:demo-instance",
        "image/jpeg",
        "c2pa-manifest demo/0.1",
    ));

    let mut actions = ActionsAssertion::new(1);
    actions.add_action(Action::new(c2pa_action::CREATED));
    manifest.add_assertion(Assertion::Actions(actions))?;
    manifest.add_assertion(Assertion::DataHash(DataHashAssertion::new(
        HashAlgorithm::Sha256,
    )))?;

    let mut store = ManifestStore::new();
    store.push_manifest(manifest)?;

    // Reserve space, bind, sign, embed
    store.sign_and_embed(&mut asset, &signer)?;
    let jumbf_len = asset.manifest_jumbf()?.map(|b| b.len()).unwrap_or(0);
    println!("Signed: {} byte asset, {jumbf_len} byte manifest store\n", asset.len());

    // Re-read everything from the asset bytes and validate
    let parsed = ManifestStore::from_asset(&asset)?.expect("manifest embedded");
    let report = parsed.validate(AssetRef::Data(&asset));
    println!("Validation of the untouched asset:");
    for entry in report.entries() {
        println!("  {:<40} {}", entry.code.as_str(), entry.explanation);
    }
    println!("  => valid: {}\n", report.is_valid());

    // Flip one content byte outside the manifest and validate again
    let exclusion = asset.hash_exclusion_range().expect("reserved range");
    asset.flip_byte(exclusion.end_offset() + 42);

    let report = parsed.validate(AssetRef::Data(&asset));
    println!("Validation after tampering one content byte:");
    for entry in report.entries() {
        println!("  {:<40} {}", entry.code.as_str(), entry.explanation);
    }
    println!("  => valid: {}", report.is_valid());

    Ok(())
}
