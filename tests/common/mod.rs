//! Shared utilities for integration tests.

#![allow(dead_code)]

use fakenet::{Connection, NetResult, Pipe};

/// Read from `conn` with a `buf_size` buffer until end-of-stream.
pub async fn read_to_end(conn: &Connection, buf_size: usize) -> NetResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; buf_size];
    loop {
        let outcome = conn.read(&mut buf).await?;
        out.extend_from_slice(&buf[..outcome.n]);
        if outcome.eof {
            return Ok(out);
        }
    }
}

/// Read from `pipe` with a `buf_size` buffer until end-of-stream.
pub async fn read_pipe_to_end(pipe: &Pipe, buf_size: usize) -> NetResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; buf_size];
    loop {
        let outcome = pipe.read(&mut buf).await?;
        out.extend_from_slice(&buf[..outcome.n]);
        if outcome.eof {
            return Ok(out);
        }
    }
}

/// Write every chunk in order, then close the write direction.
pub async fn write_chunks(conn: &Connection, chunks: &[Vec<u8>]) -> NetResult<()> {
    for chunk in chunks {
        let n = conn.write(chunk).await?;
        assert_eq!(n, chunk.len());
    }
    conn.close();
    Ok(())
}
