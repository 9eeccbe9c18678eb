// Copyright 2023 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! RSA-based mutual pairing between the Master and a node. The Master holds one long-lived
//! keypair generated at bootstrap; each node is trusted on first use and its public key is then
//! persisted on the [`crate::model::Node`] record.

use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{MasterError, MasterResult};

const KEY_BITS: usize = 2048;

/// The Master's own long-lived identity. Generated once at bootstrap (or could be loaded from a
/// configured path; loading is left as a documented extension point since nothing in the spec
/// calls for key rotation).
pub struct MasterKeypair {
    signing_key: SigningKey<Sha256>,
    public_key_der: Vec<u8>,
}

impl MasterKeypair {
    pub fn generate() -> MasterResult<Self> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, KEY_BITS)
            .map_err(|err| MasterError::Crypto(format!("key generation failed: {err}")))?;
        let public_key = RsaPublicKey::from(&private_key);
        let public_key_der = public_key
            .to_public_key_der()
            .map_err(|err| MasterError::Crypto(format!("failed to encode public key: {err}")))?
            .into_vec();
        Ok(Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
            public_key_der,
        })
    }

    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// Sign a challenge (typically a random nonce sent by the peer) with the Master's private
    /// key, so the peer can verify it against the Master's already-known public key.
    pub fn sign(&self, challenge: &[u8]) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        self.signing_key.sign_with_rng(&mut rng, challenge).to_vec()
    }
}

/// Verify that `signature` over `challenge` was produced by the holder of `public_key_der`. Used
/// to check a node's response during the handshake, against either its freshly-presented key
/// (first contact, TOFU) or its previously-stored key (subsequent reconnects).
pub fn verify(public_key_der: &[u8], challenge: &[u8], signature: &[u8]) -> MasterResult<()> {
    let public_key = RsaPublicKey::from_public_key_der(public_key_der)
        .map_err(|err| MasterError::Crypto(format!("invalid public key: {err}")))?;
    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let signature = Signature::try_from(signature)
        .map_err(|err| MasterError::Crypto(format!("invalid signature encoding: {err}")))?;
    verifying_key
        .verify(challenge, &signature)
        .map_err(|_| MasterError::Crypto("signature verification failed".to_string()))
}

/// A fresh, unpredictable challenge for one handshake round.
pub fn random_challenge() -> [u8; 32] {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_can_sign_and_be_verified() {
        let keypair = MasterKeypair::generate().unwrap();
        let challenge = random_challenge();
        let signature = keypair.sign(&challenge);
        verify(keypair.public_key_der(), &challenge, &signature).unwrap();
    }

    #[test]
    fn tampered_challenge_fails_verification() {
        let keypair = MasterKeypair::generate().unwrap();
        let challenge = random_challenge();
        let signature = keypair.sign(&challenge);
        let mut other_challenge = challenge;
        other_challenge[0] ^= 0xff;
        assert!(verify(keypair.public_key_der(), &other_challenge, &signature).is_err());
    }
}
