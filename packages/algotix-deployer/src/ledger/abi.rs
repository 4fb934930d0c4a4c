//! Method-call encoding for deployed applications (ARC-4 subset).
//!
//! A call's first application argument is the 4-byte method selector; the
//! rest are the encoded arguments. A method's return value is the last log
//! entry, prefixed with [`RETURN_PREFIX`].

use sha2::{Digest, Sha512_256};

use super::address;
use crate::error::{Error, Result};

/// Log prefix marking a method return value.
pub const RETURN_PREFIX: [u8; 4] = [0x15, 0x1f, 0x7c, 0x75];

const BOOL_TRUE: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiType {
    Uint64,
    Bool,
    Address,
}

impl AbiType {
    pub fn name(self) -> &'static str {
        match self {
            AbiType::Uint64 => "uint64",
            AbiType::Bool => "bool",
            AbiType::Address => "address",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Uint64(u64),
    Bool(bool),
    Address(String),
}

impl AbiValue {
    pub fn abi_type(&self) -> AbiType {
        match self {
            AbiValue::Uint64(_) => AbiType::Uint64,
            AbiValue::Bool(_) => AbiType::Bool,
            AbiValue::Address(_) => AbiType::Address,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            AbiValue::Uint64(v) => Ok(v.to_be_bytes().to_vec()),
            AbiValue::Bool(b) => Ok(vec![if *b { BOOL_TRUE } else { 0 }]),
            AbiValue::Address(a) => Ok(address::decode_address(a)?.to_vec()),
        }
    }

    pub fn decode(ty: AbiType, bytes: &[u8]) -> Result<Self> {
        let malformed =
            || Error::ApplicationCall(format!("malformed {} return value ({} bytes)", ty.name(), bytes.len()));
        match ty {
            AbiType::Uint64 => {
                let raw: [u8; 8] = bytes.try_into().map_err(|_| malformed())?;
                Ok(AbiValue::Uint64(u64::from_be_bytes(raw)))
            }
            AbiType::Bool => match bytes {
                [b] => Ok(AbiValue::Bool(b & BOOL_TRUE != 0)),
                _ => Err(malformed()),
            },
            AbiType::Address => {
                let raw: [u8; 32] = bytes.try_into().map_err(|_| malformed())?;
                Ok(AbiValue::Address(address::encode_address(&raw)))
            }
        }
    }
}

/// A callable method: name, argument types and optional return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbiMethod {
    pub name: &'static str,
    pub args: &'static [AbiType],
    pub returns: Option<AbiType>,
}

impl AbiMethod {
    /// Canonical signature, e.g. `check_ticket(uint64)bool`.
    pub fn signature(&self) -> String {
        let args: Vec<&str> = self.args.iter().map(|t| t.name()).collect();
        let returns = self.returns.map_or("void", AbiType::name);
        format!("{}({}){}", self.name, args.join(","), returns)
    }

    pub fn selector(&self) -> [u8; 4] {
        selector_of(&self.signature())
    }

    /// Application arguments: selector followed by each encoded argument.
    pub fn encode_args(&self, args: &[AbiValue]) -> Result<Vec<Vec<u8>>> {
        if args.len() != self.args.len() {
            return Err(Error::InvalidConfiguration(format!(
                "{} expects {} argument(s), got {}",
                self.signature(),
                self.args.len(),
                args.len()
            )));
        }
        let mut encoded = Vec::with_capacity(args.len() + 1);
        encoded.push(self.selector().to_vec());
        for (value, expected) in args.iter().zip(self.args) {
            if value.abi_type() != *expected {
                return Err(Error::InvalidConfiguration(format!(
                    "{}: expected {}, got {}",
                    self.signature(),
                    expected.name(),
                    value.abi_type().name()
                )));
            }
            encoded.push(value.encode()?);
        }
        Ok(encoded)
    }

    /// Extract the return value from a confirmed call's logs.
    pub fn decode_return(&self, logs: &[Vec<u8>]) -> Result<Option<AbiValue>> {
        let Some(ty) = self.returns else {
            return Ok(None);
        };
        let payload = logs
            .last()
            .and_then(|log| log.strip_prefix(&RETURN_PREFIX[..]))
            .ok_or_else(|| {
                Error::ApplicationCall(format!("{} logged no return value", self.signature()))
            })?;
        AbiValue::decode(ty, payload).map(Some)
    }
}

/// First four bytes of SHA-512/256 over a method signature.
pub fn selector_of(signature: &str) -> [u8; 4] {
    let digest = Sha512_256::digest(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&digest[..4]);
    selector
}
