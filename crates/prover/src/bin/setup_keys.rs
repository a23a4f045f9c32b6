//! Generate (or load) circuit keys and export the verifying keys.
//!
//! Usage: `setup-keys [keys-dir] [depth]`

use std::path::PathBuf;

use ark_std::rand::{rngs::StdRng, SeedableRng};

use identity_circuits::smt::DEFAULT_DEPTH;
use identity_prover::setup::CircuitKeys;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let keys_dir = PathBuf::from(args.next().unwrap_or_else(|| "keys".to_string()));
    let depth = match args.next() {
        Some(d) => d.parse()?,
        None => DEFAULT_DEPTH,
    };

    let keys = if keys_dir.join("manifest.json").exists() {
        println!("Loading existing keys from {:?}", keys_dir);
        CircuitKeys::load_from_directory(&keys_dir)?
    } else {
        println!("Running trusted setup for depth {depth} (this may take a while)...");
        let keys = CircuitKeys::setup(depth, &mut StdRng::from_entropy())?;
        keys.save_to_directory(&keys_dir)?;
        println!("Keys saved to {:?}", keys_dir);
        keys
    };

    let mut exported = serde_json::Map::new();
    for id in keys.circuits() {
        if let Some(pair) = keys.get(id) {
            let vk = pair.serialize_vk()?;
            println!("{id} VK ({} bytes):", vk.len());
            println!("0x{}\n", hex::encode(&vk));
            exported.insert(id.to_string(), format!("0x{}", hex::encode(&vk)).into());
        }
    }

    let json_path = keys_dir.join("verifying_keys.json");
    std::fs::write(&json_path, serde_json::to_string_pretty(&exported)?)?;
    println!("JSON exported to {:?}", json_path);
    Ok(())
}
