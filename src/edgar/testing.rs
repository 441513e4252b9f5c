use crate::edgar::fetch::Fetcher;
use anyhow::{Result, anyhow};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Serves canned bodies by URL and records every request.
#[derive(Default)]
pub struct MemoryFetcher {
    bodies: HashMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl MemoryFetcher {
    pub fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests.borrow().iter().filter(|u| *u == url).count()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch_to_file(&self, url: &str, dest: &Path) -> bool {
        self.requests.borrow_mut().push(url.to_string());
        match self.bodies.get(url) {
            Some(body) => fs::write(dest, body).is_ok(),
            None => false,
        }
    }

    fn fetch_text(&self, url: &str) -> Result<String> {
        self.requests.borrow_mut().push(url.to_string());
        let body = self
            .bodies
            .get(url)
            .ok_or_else(|| anyhow!("no canned body for {url}"))?;
        Ok(String::from_utf8_lossy(body).to_string())
    }
}

pub fn zip_bytes(members: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, body) in members {
            writer.start_file(*name, options).expect("start zip member");
            writer.write_all(body.as_bytes()).expect("write zip member");
        }
        writer.finish().expect("finish zip");
    }
    cursor.into_inner()
}

pub const LOG_HEADER: &str =
    "ip,date,time,zone,cik,accession,extention,code,size,idx,norefer,noagent,find,crawler,browser";

pub fn log_line(ip: &str, date: &str, cik: &str, accession: &str, ext: &str, code: &str) -> String {
    format!("{ip},{date},00:00:00,0.0,{cik},{accession},{ext},{code},100.0,0.0,0.0,0.0,10.0,0.0,")
}

pub fn master_index_text(rows: &[(&str, &str, &str, &str, &str)]) -> String {
    let mut out = String::from(
        "Description:           Master Index of EDGAR Dissemination Feed\n\
         Last Data Received:    March 31, 2017\n\
         Comments:              webmaster@sec.gov\n\
         Anonymous FTP:         ftp://ftp.sec.gov/edgar/\n\
         Cloud HTTP:            https://www.sec.gov/Archives/\n\
         \n\
         \n\
         \n\
         \n\
         CIK|Company Name|Form Type|Date Filed|Filename\n\
         --------------------------------------------------------------------------------\n",
    );
    for (cik, name, form, date, filename) in rows {
        out.push_str(&format!("{cik}|{name}|{form}|{date}|{filename}\n"));
    }
    out
}
