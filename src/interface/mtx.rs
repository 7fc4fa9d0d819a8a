//! Loading of [Matrix Market](https://math.nist.gov/MatrixMarket/formats.html)
//! files (plain or gzip-compressed) into the internal CSR representation.
//!
//! For matrices stored in symmetric form, pass `symmetric = true` to mirror
//! the off-diagonal entries; duplicates are summed, with stored diagonal
//! entries halved beforehand so that mirroring leaves them unchanged.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use derive_more::{Display, Error};
use flate2::bufread::GzDecoder;
use matrix_market_rs::MtxData;
use problemo::{Problem, ProblemResult};

use crate::sparse::csr::CsrMatrix;
use crate::{E, I};

#[derive(Debug, Display, Error)]
pub enum MtxError {
    #[display("failed to read matrix file")]
    Io,

    #[display("failed to parse Matrix Market data")]
    Parse,

    #[display("only sparse (coordinate) Matrix Market files are supported")]
    UnsupportedLayout,
}

/// Reads a `.mtx` or `.mtx.gz` file into a [`CsrMatrix`].
pub fn read_matrix(path: &Path, symmetric: bool) -> Result<CsrMatrix, Problem> {
    let gz = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("gz"));
    let parsed = if gz {
        let file = File::open(path).via(MtxError::Io)?;
        let mut decoder = GzDecoder::new(BufReader::new(file));
        let mut bytes = Vec::new();
        decoder.read_to_end(&mut bytes).via(MtxError::Io)?;
        let tmp = std::env::temp_dir().join(format!(
            "multifrontal-mtx-{}-{:x}.mtx",
            std::process::id(),
            bytes.len()
        ));
        {
            let mut out = File::create(&tmp).via(MtxError::Io)?;
            out.write_all(&bytes).via(MtxError::Io)?;
        }
        let parsed = MtxData::<E, 2>::from_file(&tmp);
        let _ = std::fs::remove_file(&tmp);
        parsed
    } else {
        MtxData::<E, 2>::from_file(path)
    };
    let mtx = match parsed {
        Ok(m) => m,
        Err(e) => {
            return Err(std::io::Error::other(format!("{e:?}"))).via(MtxError::Parse);
        }
    };
    let MtxData::Sparse([nrows, ncols], coord, val, _) = mtx else {
        return Err(std::io::Error::other("dense layout")).via(MtxError::UnsupportedLayout);
    };
    if nrows != ncols {
        return Err(std::io::Error::other("rectangular matrix")).via(MtxError::UnsupportedLayout);
    }
    let triplets: Vec<(I, I, E)> = if symmetric {
        coord
            .iter()
            .zip(&val)
            .flat_map(|(&[row, col], &v)| {
                let v = if row == col { v / 2. } else { v };
                [(row, col, v), (col, row, v)]
            })
            .collect()
    } else {
        coord
            .iter()
            .zip(&val)
            .map(|(&[row, col], &v)| (row, col, v))
            .collect()
    };
    match CsrMatrix::from_triplets(nrows, &triplets) {
        Ok(m) => Ok(m),
        Err(e) => Err(std::io::Error::other(format!("{e}"))).via(MtxError::Parse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_general_mtx() {
        let path = write_temp(
            "multifrontal-test-general.mtx",
            "%%MatrixMarket matrix coordinate real general\n3 3 4\n1 1 2.0\n2 2 3.0\n3 3 4.0\n1 3 -1.0\n",
        );
        let m = read_matrix(&path, false).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(m.n(), 3);
        assert_eq!(m.nnz(), 4);
        assert_eq!(m.get(0, 2), -1.);
        assert_eq!(m.get(2, 0), 0.);
    }

    #[test]
    fn test_read_symmetric_mtx_mirrors_entries() {
        let path = write_temp(
            "multifrontal-test-symmetric.mtx",
            "%%MatrixMarket matrix coordinate real symmetric\n3 3 4\n1 1 2.0\n2 1 -1.0\n2 2 2.0\n3 2 -1.0\n",
        );
        let m = read_matrix(&path, true).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(m.get(0, 1), -1.);
        assert_eq!(m.get(1, 0), -1.);
        assert_eq!(m.get(0, 0), 2.);
        assert_eq!(m.get(1, 1), 2.);
    }
}
