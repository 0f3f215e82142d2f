//! Authdata command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use keyward_core::{base64url, metadata, AuthenticatorData, PublicKeyMaterial};
use serde_json::json;
use tracing::info;

use crate::input;

/// Execute the authdata command.
pub fn execute(data: &str, json: bool, quiet: bool) -> Result<()> {
    let bytes = input::decode_text(data).context("Invalid argument: DATA is not hex or base64url")?;
    let auth_data = AuthenticatorData::parse(&bytes).context("Malformed authenticator data")?;

    info!(
        bytes = bytes.len(),
        flags = %auth_data.flags,
        sign_count = auth_data.sign_count,
        "Decoded authenticator data"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(&auth_data))?);
    } else if !quiet {
        print_report(&auth_data);
    }
    Ok(())
}

pub fn to_json(auth_data: &AuthenticatorData) -> serde_json::Value {
    let flags = auth_data.flags;
    let credential = auth_data.attested_credential.as_ref().map(|credential| {
        json!({
            "aaguid": credential.aaguid.to_string(),
            "credentialId": base64url::encode(&credential.credential_id),
            "algorithm": credential.public_key.algorithm.id(),
            "publicKey": credential.public_key.material,
            "model": metadata::lookup(credential.aaguid),
        })
    });

    json!({
        "rpIdHash": hex::encode(auth_data.rp_id_hash),
        "flags": {
            "bits": flags.bits(),
            "userPresent": flags.user_present(),
            "userVerified": flags.user_verified(),
            "backupEligible": flags.backup_eligible(),
            "backedUp": flags.backed_up(),
            "attestedCredentialData": flags.has_attested_credential_data(),
            "extensionData": flags.has_extension_data(),
        },
        "signCount": auth_data.sign_count,
        "attestedCredential": credential,
        "hasExtensions": auth_data.extensions.is_some(),
    })
}

pub fn print_report(auth_data: &AuthenticatorData) {
    let yes_no = |set: bool| if set { "yes".green() } else { "no".yellow() };
    let flags = auth_data.flags;

    println!("{}", "Authenticator data".bold());
    println!("   {} {}", "RP ID hash:".dimmed(), hex::encode(auth_data.rp_id_hash));
    println!("   {} {}", "Flags:".dimmed(), flags);
    println!("   {} {}", "User present:".dimmed(), yes_no(flags.user_present()));
    println!("   {} {}", "User verified:".dimmed(), yes_no(flags.user_verified()));
    println!(
        "   {} {} / {}",
        "Backup eligible / state:".dimmed(),
        yes_no(flags.backup_eligible()),
        yes_no(flags.backed_up())
    );
    if auth_data.sign_count == 0 {
        println!("   {} 0 {}", "Sign count:".dimmed(), "(no counter)".dimmed());
    } else {
        println!("   {} {}", "Sign count:".dimmed(), auth_data.sign_count);
    }

    if let Some(credential) = &auth_data.attested_credential {
        println!();
        println!("{}", "Attested credential".bold());
        println!("   {} {}", "AAGUID:".dimmed(), credential.aaguid);
        if let Some(model) = metadata::lookup(credential.aaguid) {
            println!("   {} {} ({})", "Model:".dimmed(), model.description, model.vendor);
        }
        println!(
            "   {} {}",
            "Credential ID:".dimmed(),
            base64url::encode(&credential.credential_id)
        );
        println!("   {} {}", "Algorithm:".dimmed(), credential.public_key.algorithm);
        println!(
            "   {} {}",
            "Public key:".dimmed(),
            describe_key(&credential.public_key.material)
        );
    }

    if auth_data.extensions.is_some() {
        println!("   {} present", "Extensions:".dimmed());
    }
}

fn describe_key(material: &PublicKeyMaterial) -> String {
    match material {
        PublicKeyMaterial::Ec2 { curve, x, .. } => {
            format!("EC2 {curve:?} x={}..", hex::encode(&x[..8.min(x.len())]))
        }
        PublicKeyMaterial::Rsa { n, e } => {
            format!("RSA {} bits, e={}", n.len() * 8, hex::encode(e))
        }
        PublicKeyMaterial::Okp { curve, x } => {
            format!("OKP {curve:?} x={}..", hex::encode(&x[..8.min(x.len())]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_auth_data(flags: u8, sign_count: u32) -> Vec<u8> {
        let mut data = vec![0xAA; 32];
        data.push(flags);
        data.extend_from_slice(&sign_count.to_be_bytes());
        data
    }

    #[test]
    fn test_json_report() {
        let auth_data = AuthenticatorData::parse(&minimal_auth_data(0x05, 42)).unwrap();
        let value = to_json(&auth_data);

        assert_eq!(value["signCount"], 42);
        assert_eq!(value["flags"]["userPresent"], true);
        assert_eq!(value["flags"]["userVerified"], true);
        assert_eq!(value["flags"]["backedUp"], false);
        assert!(value["attestedCredential"].is_null());
    }

    #[test]
    fn test_execute_rejects_short_data() {
        let err = execute("aabb", false, true).unwrap_err();
        assert!(format!("{err:#}").starts_with("Malformed authenticator data"));
    }
}
