//! Shared-dictionary DEFLATE contexts for header blocks
//!
//! SPDY/2 compresses every header block on a session through one
//! continuous zlib stream per direction, primed with a fixed dictionary
//! that is never transmitted. Frames must therefore be compressed and
//! decompressed in wire order; reordering corrupts the context for the
//! rest of the connection.

use super::error::{Error, Result};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// The SPDY/2 compression dictionary.
///
/// Both peers prime their zlib contexts with this exact byte sequence,
/// trailing NUL included.
pub const DICTIONARY: &[u8] = concat!(
    "optionsgetheadpostputdeletetraceacceptaccept-charsetaccept-encodingaccept-",
    "languageauthorizationexpectfromhostif-modified-sinceif-matchif-none-matchi",
    "f-rangeif-unmodifiedsincemax-forwardsproxy-authorizationrangerefererteuser",
    "-agent10010120020120220320420520630030130230330430530630740040140240340440",
    "5406407408409410411412413414415416417500501502503504505accept-rangesageeta",
    "glocationproxy-authenticatepublicretry-afterservervarywarningwww-authentic",
    "atemethodgetstatus200 OKversionHTTP/1.1urlpublicset-cookiekeep-aliveorigin",
    "100101201202205206300302303304305306307402405406407408409410411412413414415",
    "416417502504505203 Non-Authoritative Information204 No Content301 Moved Pe",
    "rmanently400 Bad Request401 Unauthorized403 Forbidden404 Not Found500 Inte",
    "rnal Server Error501 Not Implemented503 Service UnavailableJan Feb Mar Apr",
    " May Jun Jul Aug Sept Oct Nov Dec 00:00:00 Mon, Tue, Wed, Thu, Fri, Sat, S",
    "un, GMTchunked,text/html,image/png,image/jpg,image/gif,application/xml,ap",
    "plication/xhtml+xml,text/plain,text/javascript,publicprivatemax-age=gzip,d",
    "eflate,sdchcharset=utf-8charset=iso-8859-1,utf-,*,enq=0.",
    "\0",
)
.as_bytes();

/// Outbound compression context, one per session direction
pub struct HeaderCompressor {
    raw: Compress,
}

impl HeaderCompressor {
    /// Create a compressor primed with the SPDY dictionary
    pub fn new() -> Result<Self> {
        let mut raw = Compress::new(Compression::default(), true);
        raw.set_dictionary(DICTIONARY).map_err(|_| Error::ZlibInit)?;
        Ok(HeaderCompressor { raw })
    }

    /// Compress one header block, SYNC-flushed so the peer can inflate it
    /// without waiting for further frames.
    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() / 2 + 128);
        let mut offset = 0usize;
        loop {
            let before_in = self.raw.total_in() as usize;
            let status = self
                .raw
                .compress_vec(&input[offset..], &mut out, FlushCompress::Sync)
                .map_err(|_| Error::CompressFailure)?;
            offset += self.raw.total_in() as usize - before_in;

            match status {
                Status::Ok | Status::BufError => {
                    if offset == input.len() && out.len() < out.capacity() {
                        return Ok(out);
                    }
                    out.reserve(out.capacity().max(256));
                }
                Status::StreamEnd => return Ok(out),
            }
        }
    }
}

/// Inbound decompression context, one per session direction
pub struct HeaderDecompressor {
    raw: Decompress,
}

impl HeaderDecompressor {
    /// Create a decompressor; the dictionary is supplied when zlib asks
    /// for it on the first block.
    pub fn new() -> Self {
        HeaderDecompressor {
            raw: Decompress::new(true),
        }
    }

    /// Inflate one compressed header block.
    pub fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len().saturating_mul(4).max(256));
        let mut offset = 0usize;
        loop {
            let before_in = self.raw.total_in() as usize;
            let res = self
                .raw
                .decompress_vec(&input[offset..], &mut out, FlushDecompress::Sync);
            offset += self.raw.total_in() as usize - before_in;

            match res {
                Ok(Status::Ok) | Ok(Status::BufError) => {
                    if offset == input.len() && out.len() < out.capacity() {
                        return Ok(out);
                    }
                    out.reserve(out.capacity().max(512));
                }
                Ok(Status::StreamEnd) => return Ok(out),
                Err(e) if e.needs_dictionary().is_some() => {
                    self.raw
                        .set_dictionary(DICTIONARY)
                        .map_err(|_| Error::DecompressFailure)?;
                }
                Err(_) => return Err(Error::DecompressFailure),
            }
        }
    }
}
