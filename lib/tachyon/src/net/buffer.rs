use slice_deque::SliceDeque;
use std::io;

type ByteDeque = SliceDeque<u8>;

// Reservations happen in whole increments to keep the mirrored pages coarse.
const BUF_SIZE_INCREMENT: usize = 65536;

/// A dynamically sized, double ended, buffered FIFO byte queue. Data is
/// appended at the tail and read from the head; the buffer grows by whole
/// increments when full.
pub struct Buffer {
    data: ByteDeque,
}

impl Buffer {
    #[inline]
    pub fn new() -> Buffer {
        let mut data = ByteDeque::new();
        data.reserve(BUF_SIZE_INCREMENT);
        Buffer { data }
    }

    /// The number of bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true in case the buffer is empty, false otherwise.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remaining free capacity before the next growth.
    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.data.capacity() - self.data.len()
    }

    /// Appends bytes at the tail, growing as needed.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.free_capacity() < bytes.len() {
            self.data.reserve(bytes.len());
        }

        unsafe {
            self.data.tail_head_slice()[..bytes.len()].copy_from_slice(bytes);
            self.data.move_tail(bytes.len() as isize);
        }
    }

    /// Drains all buffered bytes.
    pub fn take(&mut self) -> Vec<u8> {
        let drained = self.data.as_slice().to_vec();
        self.clear();
        drained
    }

    #[inline]
    pub fn clear(&mut self) {
        let count = self.len();
        self.move_head(count);
    }

    /// Advance the head.
    #[inline]
    pub fn move_head(&mut self, count: usize) {
        unsafe { self.data.move_head(count as isize) }
    }

    /// Slice containing data.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Write the contents of the buffer to the supplied writer, advancing
    /// the read offset past everything accepted. A would-block mid-way
    /// surfaces as the error; partial progress stays buffered.
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let orig_len = self.data.len();

        while !self.data.is_empty() {
            let count = writer.write(&self.data)?;

            if count == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }

            self.move_head(count);
        }

        Ok(orig_len)
    }

    /// Read from the supplied reader until it would block, growing as
    /// needed. A zero-length read (peer end of stream) surfaces as
    /// `UnexpectedEof`; a would-block ends the drain normally.
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let mut total = 0;

        loop {
            if self.free_capacity() == 0 {
                self.data.reserve(BUF_SIZE_INCREMENT);
            }

            let result = unsafe { reader.read(self.data.tail_head_slice()) };

            match result {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(count) => {
                    unsafe { self.data.move_tail(count as isize) };
                    total += count;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(err) => return Err(err),
            }
        }
    }
}
