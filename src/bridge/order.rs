//! Order descriptors for the order-matching bridge.
//!
//! ## Order Hash
//!
//! Variable-length fields (calldata, replacement pattern, static extradata)
//! are first reduced to SHA-256 digests. Those digests plus the fixed fields
//! form an SSZ container ([`OrderTerms`]) whose SHA-256 hash is the order
//! hash that makers sign.
//!
//! ## Signatures
//!
//! Makers sign the 32-byte order hash with recoverable secp256k1 ECDSA. The
//! signature is carried as `(v, r, s)` with `v = 27 + recovery_id`, and the
//! maker address is recovered from it, so no public key travels with the
//! order.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use ssz_rs::prelude::*;

use crate::bridge::MatchError;
use crate::types::{Address, Amount};

/// 32-byte order hash
pub type OrderHash = [u8; 32];

// ============================================================================
// Side enum
// ============================================================================

/// Order side: Buy or Sell
///
/// Represented as u8 in the hashed terms:
/// - Buy = 0
/// - Sell = 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    /// Buy order - acquires the asset, pays the price
    #[default]
    Buy,
    /// Sell order - delivers the asset, receives the price
    Sell,
}

impl Side {
    /// Convert to u8 for hashing
    pub fn to_u8(self) -> u8 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        }
    }

    /// Returns the opposite side
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

// ============================================================================
// SaleKind enum
// ============================================================================

/// Pricing rule. Only fixed-price sales are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SaleKind {
    #[default]
    FixedPrice,
}

impl SaleKind {
    pub fn to_u8(self) -> u8 {
        match self {
            SaleKind::FixedPrice => 0,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SaleKind::FixedPrice),
            _ => None,
        }
    }
}

// ============================================================================
// Order struct
// ============================================================================

/// An order as submitted to the bridge.
///
/// `calldata` is a call template against `target`. The counter-order may
/// overwrite exactly the bytes set in `replacement_pattern` (for instance the
/// recipient word of a transfer call). `static_target` and
/// `static_extradata` describe an optional read-only pre-check the bridge
/// runs against the patched calldata before executing anything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Order {
    /// Exchange registry the order is valid on
    pub exchange: Address,
    pub maker: Address,
    /// Required counterparty; zero means anyone
    pub taker: Address,
    pub side: Side,
    pub sale_kind: SaleKind,
    /// Contract the call is executed against
    pub target: Address,
    pub calldata: Vec<u8>,
    pub replacement_pattern: Vec<u8>,
    /// Zero means no static pre-check
    pub static_target: Address,
    pub static_extradata: Vec<u8>,
    pub base_price: Amount,
    /// Unix seconds from which the order is valid
    pub listing_time: u64,
    /// Unix seconds at which the order expires; 0 means never
    pub expiration_time: u64,
    /// Replay-protection nonce
    pub salt: [u8; 32],
    /// May be matched more than once
    pub reusable: bool,
}

/// Fixed-size SSZ container hashed to produce the order hash
#[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
pub struct OrderTerms {
    pub exchange: [u8; 20],
    pub maker: [u8; 20],
    pub taker: [u8; 20],
    pub side: u8,
    pub sale_kind: u8,
    pub target: [u8; 20],
    pub calldata_hash: [u8; 32],
    pub replacement_pattern_hash: [u8; 32],
    pub static_target: [u8; 20],
    pub static_extradata_hash: [u8; 32],
    pub base_price_hi: u64,
    pub base_price_lo: u64,
    pub listing_time: u64,
    pub expiration_time: u64,
    pub salt: [u8; 32],
    pub reusable: bool,
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

impl Order {
    /// Fixed-size terms covered by the signature
    pub fn terms(&self) -> OrderTerms {
        OrderTerms {
            exchange: self.exchange.0,
            maker: self.maker.0,
            taker: self.taker.0,
            side: self.side.to_u8(),
            sale_kind: self.sale_kind.to_u8(),
            target: self.target.0,
            calldata_hash: sha256(&self.calldata),
            replacement_pattern_hash: sha256(&self.replacement_pattern),
            static_target: self.static_target.0,
            static_extradata_hash: sha256(&self.static_extradata),
            base_price_hi: (self.base_price >> 64) as u64,
            base_price_lo: self.base_price as u64,
            listing_time: self.listing_time,
            expiration_time: self.expiration_time,
            salt: self.salt,
            reusable: self.reusable,
        }
    }

    /// SHA-256 of the SSZ-encoded terms
    pub fn hash(&self) -> Result<OrderHash, MatchError> {
        let bytes = ssz_rs::serialize(&self.terms()).map_err(|e| MatchError::Encoding(format!("{e:?}")))?;
        Ok(sha256(&bytes))
    }

    /// Whether the order is inside its validity window at `now`
    pub fn is_live(&self, now: u64) -> bool {
        self.listing_time <= now && (self.expiration_time == 0 || now < self.expiration_time)
    }

    /// Sign the order hash with the maker's key
    ///
    /// The key must belong to `self.maker`.
    pub fn sign(self, key: &SigningKey) -> Result<SignedOrder, MatchError> {
        let signer = Address::from_verifying_key(key.verifying_key());
        if signer != self.maker {
            return Err(MatchError::BadSignature {
                expected: self.maker,
                recovered: Some(signer),
            });
        }

        let hash = self.hash()?;
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| MatchError::Encoding(format!("signing failed: {e}")))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(SignedOrder {
            order: self,
            signature: OrderSignature {
                v: 27 + recovery_id.to_byte(),
                r,
                s,
            },
        })
    }
}

// ============================================================================
// Signatures
// ============================================================================

/// Recoverable ECDSA signature material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderSignature {
    /// 27 or 28
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

/// An order plus its maker's signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOrder {
    pub order: Order,
    pub signature: OrderSignature,
}

impl SignedOrder {
    /// Recover the address that signed this order's hash
    pub fn recover_signer(&self) -> Result<Address, MatchError> {
        let hash = self.order.hash()?;

        let recovery_id = self
            .signature
            .v
            .checked_sub(27)
            .and_then(RecoveryId::from_byte)
            .ok_or(MatchError::BadSignature {
                expected: self.order.maker,
                recovered: None,
            })?;

        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.signature.r);
        bytes[32..].copy_from_slice(&self.signature.s);
        let signature = Signature::from_slice(&bytes).map_err(|_| MatchError::BadSignature {
            expected: self.order.maker,
            recovered: None,
        })?;

        let key = VerifyingKey::recover_from_prehash(&hash, &signature, recovery_id).map_err(|_| {
            MatchError::BadSignature {
                expected: self.order.maker,
                recovered: None,
            }
        })?;
        Ok(Address::from_verifying_key(&key))
    }

    /// Check that the maker signed this exact order
    pub fn verify(&self) -> Result<OrderHash, MatchError> {
        let recovered = self.recover_signer()?;
        if recovered != self.order.maker {
            return Err(MatchError::BadSignature {
                expected: self.order.maker,
                recovered: Some(recovered),
            });
        }
        self.order.hash()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
