// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software
// and associated documentation files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or
// substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use std::{
    convert::From,
    fmt::{self, Display},
};

use failure::{Backtrace, Context, Fail};

/// An error raised while loading a BSP file.
///
/// Every failure falls into one of the three categories of [`BspErrorKind`]. The underlying
/// I/O error or a message describing the structural problem is kept as the cause.
#[derive(Debug)]
pub struct BspError {
    inner: Context<BspErrorKind>,
}

impl BspError {
    pub fn kind(&self) -> BspErrorKind {
        *self.inner.get_context()
    }

    pub(crate) fn with_msg<S>(kind: BspErrorKind, msg: S) -> Self
    where
        S: Display,
    {
        format_err!("{}", msg).context(kind).into()
    }
}

impl From<BspErrorKind> for BspError {
    fn from(kind: BspErrorKind) -> Self {
        BspError {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<BspErrorKind>> for BspError {
    fn from(inner: Context<BspErrorKind>) -> Self {
        BspError { inner }
    }
}

impl Fail for BspError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for BspError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Fail)]
pub enum BspErrorKind {
    /// A seek or read on the source stream failed or came up short.
    #[fail(display = "I/O error reading BSP data")]
    Io,
    /// The data is not a well-formed version 29 BSP file.
    #[fail(display = "Malformed BSP data")]
    Format,
    /// The allocator refused a required allocation.
    #[fail(display = "BSP allocation failed")]
    Allocation,
}
