//! # Typed Queries
//!
//! Convenience calls for the common blockchain and transaction-pool commands.
//! Each one builds the command payload, goes through [`Client::call`] and
//! decodes the fixed-width integers in the body. Block headers and
//! transactions are returned as raw serialized bytes.
//!
//! Every query returns `(error_code, value)`: when the service reports an error
//! the value is `None`.

use chainwire::ErrorCode;

use crate::client::Client;
use crate::client::Reply;
use crate::client::Subscription;
use crate::error::Error;
use crate::error::Result;

pub const FETCH_LAST_HEIGHT: &[u8] = b"blockchain.fetch_last_height";
pub const FETCH_BLOCK_HEADER: &[u8] = b"blockchain.fetch_block_header";
pub const FETCH_BLOCK_TRANSACTION_HASHES: &[u8] = b"blockchain.fetch_block_transaction_hashes";
pub const FETCH_BLOCK_HEIGHT: &[u8] = b"blockchain.fetch_block_height";
pub const FETCH_TRANSACTION: &[u8] = b"blockchain.fetch_transaction";
pub const FETCH_TRANSACTION2: &[u8] = b"blockchain.fetch_transaction2";
pub const FETCH_SPEND: &[u8] = b"blockchain.fetch_spend";
pub const FETCH_TRANSACTION_INDEX: &[u8] = b"blockchain.fetch_transaction_index";
pub const POOL_FETCH_TRANSACTION: &[u8] = b"transaction_pool.fetch_transaction";
pub const POOL_BROADCAST: &[u8] = b"transaction_pool.broadcast";
pub const SUBSCRIBE_ADDRESS: &[u8] = b"subscribe.address";
pub const UNSUBSCRIBE_ADDRESS: &[u8] = b"unsubscribe_address";

/// Length of a block or transaction hash.
pub const HASH_LEN: usize = 32;

/// The result of a typed query.
pub type Answer<T> = (Option<ErrorCode>, Option<T>);

/// Addresses a block either by height or by hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIndex {
    Height(u32),
    /// Hash bytes in wire order.
    Hash([u8; HASH_LEN]),
}

impl BlockIndex {
    /// Parses a 64 character hex hash, keeping the byte order as written.
    pub fn from_hex(hash: &str) -> Result<Self> {
        let bytes = hex::decode(hash).map_err(|e| Error::Decode(e.to_string()))?;
        let hash = <[u8; HASH_LEN]>::try_from(bytes)
            .map_err(|bytes| Error::Decode(format!("hash must be {} bytes, got {}", HASH_LEN, bytes.len())))?;
        Ok(Self::Hash(hash))
    }

    /// The request payload: 4 bytes little-endian for a height, the raw hash otherwise.
    pub fn pack(&self) -> Vec<u8> {
        match self {
            Self::Height(height) => height.to_le_bytes().to_vec(),
            Self::Hash(hash) => hash.to_vec(),
        }
    }
}

impl From<u32> for BlockIndex {
    fn from(height: u32) -> Self {
        Self::Height(height)
    }
}

/// A transaction output (when asking) or input (when answered): a transaction
/// hash in wire order and a position within that transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub hash: [u8; HASH_LEN],
    pub index: u32,
}

impl Point {
    pub const LEN: usize = HASH_LEN + 4;

    /// Builds a point from a display-order transaction hash.
    pub fn from_display(hash: &str, index: u32) -> Result<Self> {
        Ok(Self {
            hash: hash_from_display(hash)?,
            index,
        })
    }

    /// The hash followed by the index, 4 bytes little-endian.
    pub fn pack(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(Self::LEN);
        packed.extend_from_slice(&self.hash);
        packed.extend_from_slice(&self.index.to_le_bytes());
        packed
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != Self::LEN {
            return Err(Error::Decode(format!(
                "point must be {} bytes, got {}",
                Self::LEN,
                data.len()
            )));
        }
        let hash = <[u8; HASH_LEN]>::try_from(&data[..HASH_LEN])
            .map_err(|e| Error::Decode(e.to_string()))?;
        Ok(Self {
            hash,
            index: read_u32(data, HASH_LEN)?,
        })
    }
}

/// Decodes a hash given in display order into wire order.
pub fn hash_from_display(hash: &str) -> Result<[u8; HASH_LEN]> {
    let BlockIndex::Hash(mut bytes) = BlockIndex::from_hex(hash)? else {
        return Err(Error::Decode("expected a hash".into()));
    };
    bytes.reverse();
    Ok(bytes)
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    data.get(at..at + 4)
        .and_then(|word| <[u8; 4]>::try_from(word).ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| Error::Decode(format!("body of {} bytes has no u32 at {}", data.len(), at)))
}

/// Splits a reply into its error code and, on success, a decoded value.
fn answer<T>(reply: Reply, decode: impl FnOnce(Vec<u8>) -> Result<T>) -> Result<Answer<T>> {
    match reply {
        (Some(code), _) => Ok((Some(code), None)),
        (None, Some(data)) => Ok((None, Some(decode(data)?))),
        (None, None) => Err(Error::Decode("success without a body".into())),
    }
}

impl Client {
    /// Height of the last block in the service's chain.
    pub async fn last_height(&self) -> Result<Answer<u32>> {
        let reply = self.call(FETCH_LAST_HEIGHT, b"").await?;
        answer(reply, |data| read_u32(&data, 0))
    }

    /// Serialized header of a block.
    pub async fn block_header_raw(&self, index: impl Into<BlockIndex>) -> Result<Answer<Vec<u8>>> {
        let reply = self.call(FETCH_BLOCK_HEADER, &index.into().pack()).await?;
        answer(reply, Ok)
    }

    /// Hashes of the transactions in a block, in wire order.
    pub async fn block_transaction_hashes(
        &self,
        index: impl Into<BlockIndex>,
    ) -> Result<Answer<Vec<[u8; HASH_LEN]>>> {
        let reply = self
            .call(FETCH_BLOCK_TRANSACTION_HASHES, &index.into().pack())
            .await?;
        answer(reply, |data| {
            let rows = data.chunks_exact(HASH_LEN);
            if !rows.remainder().is_empty() {
                return Err(Error::Decode(format!(
                    "{} bytes is not a whole number of hashes",
                    data.len()
                )));
            }
            Ok(rows
                .filter_map(|row| <[u8; HASH_LEN]>::try_from(row).ok())
                .collect())
        })
    }

    /// Height of the block with the given display-order hash.
    pub async fn block_height(&self, hash: &str) -> Result<Answer<u32>> {
        let reply = self.call(FETCH_BLOCK_HEIGHT, &hash_from_display(hash)?).await?;
        answer(reply, |data| read_u32(&data, 0))
    }

    /// Serialized transaction from the chain.
    pub async fn transaction_raw(&self, hash: &str) -> Result<Answer<Vec<u8>>> {
        let reply = self.call(FETCH_TRANSACTION, &hash_from_display(hash)?).await?;
        answer(reply, Ok)
    }

    /// Serialized transaction from the chain, through the newer lookup.
    pub async fn transaction2(&self, hash: &str) -> Result<Answer<Vec<u8>>> {
        let reply = self.call(FETCH_TRANSACTION2, &hash_from_display(hash)?).await?;
        answer(reply, Ok)
    }

    /// The input that spends output `index` of a transaction.
    pub async fn spend(&self, output_transaction_hash: &str, index: u32) -> Result<Answer<Point>> {
        let output = Point::from_display(output_transaction_hash, index)?;
        let reply = self.call(FETCH_SPEND, &output.pack()).await?;
        answer(reply, |data| Point::parse(&data))
    }

    /// Serialized transaction that may still be unconfirmed.
    pub async fn pool_transaction_raw(&self, hash: &str) -> Result<Answer<Vec<u8>>> {
        let reply = self.call(POOL_FETCH_TRANSACTION, &hash_from_display(hash)?).await?;
        answer(reply, Ok)
    }

    /// Height of the block containing a transaction, and its position in it.
    pub async fn transaction_index(&self, hash: &str) -> Result<Answer<(u32, u32)>> {
        let reply = self
            .call(FETCH_TRANSACTION_INDEX, &hash_from_display(hash)?)
            .await?;
        answer(reply, |data| Ok((read_u32(&data, 0)?, read_u32(&data, 4)?)))
    }

    /// Submits a serialized transaction to the pool.
    pub async fn broadcast(&self, raw_transaction: &[u8]) -> Result<Option<ErrorCode>> {
        let (code, _) = self.call(POOL_BROADCAST, raw_transaction).await?;
        Ok(code)
    }

    /// Subscribes to activity on an address, given as its 20 byte hash.
    pub async fn subscribe_address(&self, address_hash: &[u8]) -> Result<Answer<Subscription>> {
        self.subscribe(SUBSCRIBE_ADDRESS, address_hash).await
    }

    /// Asks the service to end an address subscription.
    ///
    /// See [`Client::unsubscribe`] for what happens to the local entry.
    pub async fn unsubscribe_address(&self, address_hash: &[u8]) -> Result<Reply> {
        self.unsubscribe(UNSUBSCRIBE_ADDRESS, address_hash).await
    }
}
