use bytes::{BufMut, Bytes, BytesMut};

/// One encoded container page as handed back by the page source:
/// a header block and a body block, serialized by plain concatenation.
/// The multiplexer adds no framing of its own between pages.
#[derive(Clone, Debug)]
pub struct Page {
    header: Bytes,
    body: Bytes,
}

impl Page {
    pub fn new(header: Bytes, body: Bytes) -> Self {
        Self { header, body }
    }

    pub fn header(&self) -> &Bytes {
        &self.header
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn header_len(&self) -> usize {
        self.header.len()
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    pub fn len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends header + body to `buf` as one contiguous block.
    pub fn write_into(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.header);
        buf.put_slice(&self.body);
    }

    /// Serializes the page into one contiguous buffer.
    pub fn into_bytes(self) -> Bytes {
        if self.body.is_empty() {
            return self.header;
        }
        let mut buf = BytesMut::with_capacity(self.len());
        self.write_into(&mut buf);
        buf.freeze()
    }
}
