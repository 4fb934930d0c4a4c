//! Canonical msgpack form of transactions.
//!
//! The node accepts transactions only in this form: map keys sorted, zero and
//! empty fields omitted, addresses and hashes as raw bytes. Signatures and
//! transaction ids are computed over `"TX" || encoded`.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use data_encoding::BASE32_NOPAD;
use rmpv::Value;
use sha2::{Digest, Sha512_256};
use std::collections::BTreeMap;

use super::{address, AssetParams, StateSchema, Transaction, TransactionKind};
use crate::error::{Error, Result};

/// Domain separator prefixed to a transaction before hashing or signing.
pub const TX_DOMAIN: &[u8] = b"TX";

/// Bytes a signature adds to an encoded transaction, for fee estimation.
const SIGNATURE_OVERHEAD: u64 = 75;

/// Field map that drops zero values and keeps keys sorted.
#[derive(Default)]
struct Fields(BTreeMap<&'static str, Value>);

impl Fields {
    fn uint(mut self, key: &'static str, value: u64) -> Self {
        if value != 0 {
            self.0.insert(key, Value::from(value));
        }
        self
    }

    fn flag(mut self, key: &'static str, value: bool) -> Self {
        if value {
            self.0.insert(key, Value::Boolean(true));
        }
        self
    }

    fn text(mut self, key: &'static str, value: &str) -> Self {
        if !value.is_empty() {
            self.0.insert(key, Value::from(value));
        }
        self
    }

    fn bytes(mut self, key: &'static str, value: &[u8]) -> Self {
        if !value.is_empty() {
            self.0.insert(key, Value::Binary(value.to_vec()));
        }
        self
    }

    fn list(mut self, key: &'static str, items: Vec<Value>) -> Self {
        if !items.is_empty() {
            self.0.insert(key, Value::Array(items));
        }
        self
    }

    fn nested(mut self, key: &'static str, fields: Fields) -> Self {
        if !fields.0.is_empty() {
            self.0.insert(key, fields.into_value());
        }
        self
    }

    fn into_value(self) -> Value {
        Value::Map(
            self.0
                .into_iter()
                .map(|(key, value)| (Value::from(key), value))
                .collect(),
        )
    }
}

fn schema(schema: &StateSchema) -> Fields {
    Fields::default()
        .uint("nbs", schema.num_byte_slices)
        .uint("nui", schema.num_uints)
}

fn asset_params(params: &AssetParams) -> Result<Fields> {
    let manager = params
        .manager
        .as_deref()
        .map(address::decode_address)
        .transpose()?;
    Ok(Fields::default()
        .uint("t", params.total)
        .uint("dc", u64::from(params.decimals))
        .flag("df", params.default_frozen)
        .text("un", &params.unit_name)
        .text("an", &params.asset_name)
        .text("au", &params.url)
        .bytes("m", manager.as_ref().map_or(&[][..], |key| &key[..])))
}

fn account_list(accounts: &[String]) -> Result<Vec<Value>> {
    accounts
        .iter()
        .map(|account| address::decode_address(account).map(|key| Value::Binary(key.to_vec())))
        .collect()
}

fn transaction_fields(txn: &Transaction, fee: u64) -> Result<Fields> {
    let params = &txn.params;
    let genesis_hash = B64.decode(&params.genesis_hash).map_err(|e| {
        Error::InvalidConfiguration(format!("genesis hash is not base64: {e}"))
    })?;
    let fields = Fields::default()
        .uint("fee", fee)
        .uint("fv", params.first_valid)
        .uint("lv", params.last_valid)
        .text("gen", &params.genesis_id)
        .bytes("gh", &genesis_hash)
        .bytes("snd", &address::decode_address(&txn.sender)?);

    let fields = match &txn.kind {
        TransactionKind::ApplicationCreate {
            approval_program,
            clear_program,
            global_schema,
            local_schema,
        } => fields
            .text("type", "appl")
            .bytes("apap", approval_program)
            .bytes("apsu", clear_program)
            .nested("apgs", schema(global_schema))
            .nested("apls", schema(local_schema)),

        TransactionKind::ApplicationCall {
            app_id,
            app_args,
            foreign_assets,
            accounts,
        } => fields
            .text("type", "appl")
            .uint("apid", *app_id)
            .list("apaa", app_args.iter().cloned().map(Value::Binary).collect())
            .list("apas", foreign_assets.iter().map(|id| Value::from(*id)).collect())
            .list("apat", account_list(accounts)?),

        TransactionKind::AssetCreate(params) => fields
            .text("type", "acfg")
            .nested("apar", asset_params(params)?),

        TransactionKind::AssetTransfer {
            asset_id,
            receiver,
            amount,
        } => fields
            .text("type", "axfer")
            .uint("xaid", *asset_id)
            .bytes("arcv", &address::decode_address(receiver)?)
            .uint("aamt", *amount),
    };
    Ok(fields)
}

fn write(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value)
        .map_err(|e| Error::InvalidConfiguration(format!("unencodable transaction: {e}")))?;
    Ok(buf)
}

/// A transaction in wire form, ready to be signed or simulated.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTransaction {
    value: Value,
    bytes: Vec<u8>,
}

impl EncodedTransaction {
    /// Encode `txn`. The fee is the suggested per-byte fee times the signed
    /// size, floored at the minimum fee.
    pub fn new(txn: &Transaction) -> Result<Self> {
        let floor = txn.params.min_fee;
        let encoded = Self::with_fee(txn, floor)?;
        let by_size = txn
            .params
            .fee
            .saturating_mul(encoded.bytes.len() as u64 + SIGNATURE_OVERHEAD);
        if by_size > floor {
            return Self::with_fee(txn, by_size);
        }
        Ok(encoded)
    }

    fn with_fee(txn: &Transaction, fee: u64) -> Result<Self> {
        let value = transaction_fields(txn, fee)?.into_value();
        let bytes = write(&value)?;
        Ok(Self { value, bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `"TX" || encoded`: what gets signed and hashed.
    pub fn signing_message(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(TX_DOMAIN.len() + self.bytes.len());
        message.extend_from_slice(TX_DOMAIN);
        message.extend_from_slice(&self.bytes);
        message
    }

    /// Transaction id as the node reports it.
    pub fn id(&self) -> String {
        BASE32_NOPAD.encode(&Sha512_256::digest(self.signing_message()))
    }

    /// Signed transaction `{sig, txn}` for submission.
    pub fn sign_with(&self, signature: &[u8; 64]) -> Result<Vec<u8>> {
        write(&Value::Map(vec![
            (Value::from("sig"), Value::Binary(signature.to_vec())),
            (Value::from("txn"), self.value.clone()),
        ]))
    }

    fn unsigned(&self) -> Value {
        Value::Map(vec![(Value::from("txn"), self.value.clone())])
    }
}

/// Simulation request evaluating one unsigned transaction. Resources the
/// program touches need not be listed on the call.
pub fn simulate_request(txn: &EncodedTransaction) -> Result<Vec<u8>> {
    let group = Value::Map(vec![(
        Value::from("txns"),
        Value::Array(vec![txn.unsigned()]),
    )]);
    write(&Value::Map(vec![
        (Value::from("allow-empty-signatures"), Value::Boolean(true)),
        (Value::from("allow-unnamed-resources"), Value::Boolean(true)),
        (Value::from("txn-groups"), Value::Array(vec![group])),
    ]))
}
