mod common;

use std::io::Cursor;

use common::{FlakyDisk, ImageSpec, RESERVED_SECTORS, NUM_FATS};
use fat32_drive::fat32::{Degraded, FsInfoField};
use fat32_drive::{Fat32Error, Fat32Volume, ImageDisk, MountOptions};

#[test]
fn mounts_a_superfloppy_volume() {
    let image = ImageSpec::default();
    let layout = image.layout();
    let volume = common::mount(image.build());

    let session = volume.session();
    assert_eq!(session.unused_sectors, 0);
    assert_eq!(session.root_cluster, 2);
    assert_eq!(session.sectors_per_cluster, 1);
    assert_eq!(session.total_clusters, layout.total_clusters);
    assert_eq!(session.first_data_sector, layout.first_data);
    assert_eq!(session.fs_info_sector, 1);
    assert!(session.free_count_valid);
}

#[test]
fn mounts_through_an_mbr() {
    let image = ImageSpec {
        partition_offset: Some(63),
        sectors_per_cluster: 4,
        ..ImageSpec::default()
    };
    let layout = image.layout();
    let mut volume = common::mount(image.build());

    assert_eq!(volume.session().unused_sectors, 63);
    assert_eq!(volume.session().fs_info_sector, 64);
    assert_eq!(volume.session().first_data_sector, layout.first_data);
    assert!(volume.session().free_count_valid);

    let data = common::pattern(3000);
    let entry = common::write_file(&mut volume, "INPART.BIN", &data);
    assert_eq!(common::read_file(&mut volume, "INPART.BIN"), data);

    // Data landed inside the partition, where the layout puts the cluster
    let img = common::unmount(volume);
    let offset = layout.cluster_offset(entry.start_cluster);
    assert_eq!(&img[offset..offset + 512], &data[..512]);
}

#[test]
fn cluster_sectors_increase_past_the_fat_region() {
    let image = ImageSpec {
        sectors_per_cluster: 8,
        partition_offset: Some(2048),
        ..ImageSpec::default()
    };
    let layout = image.layout();
    let volume = common::mount(image.build());

    let fat_end = layout.part + RESERVED_SECTORS + NUM_FATS * layout.fat_size;
    let max = volume.session().max_cluster();
    let sector = |cluster| volume.cluster_to_sector(cluster).unwrap();
    assert!(sector(2) >= fat_end);
    for cluster in 2..max {
        assert!(sector(cluster + 1) > sector(cluster));
    }
    assert_eq!(sector(3) - sector(2), 8);
}

#[test]
fn reserved_clusters_have_no_sector() {
    let volume = common::mount(ImageSpec::default().build());
    let max = volume.session().max_cluster();
    for cluster in [0, 1, max + 1] {
        assert!(matches!(
            volume.cluster_to_sector(cluster),
            Err(Fat32Error::ChainCorrupt { cluster: c }) if c == cluster
        ));
    }
    // The session mapping saturates instead of wrapping
    assert_eq!(
        volume.session().cluster_to_sector(0),
        volume.session().first_data_sector
    );
}

#[test]
fn partition_offset_wins_over_zero_hidden_sectors() {
    let image = ImageSpec {
        partition_offset: Some(64),
        ..ImageSpec::default()
    };
    let layout = image.layout();
    let mut img = image.build();
    // Some formatters leave the BPB hidden-sectors field at 0
    common::put_u32(&mut img, layout.part as usize * 512 + 0x1C, 0);
    let fat2_start = layout.fat_offset(1, 0);
    let fat2_before = img[fat2_start..fat2_start + 512].to_vec();

    let mut volume = common::mount(img);
    assert_eq!(volume.session().first_data_sector, layout.first_data);

    let data = common::pattern(600);
    let entry = common::write_file(&mut volume, "A.BIN", &data);
    assert_eq!(common::read_file(&mut volume, "A.BIN"), data);

    let img = common::unmount(volume);
    let offset = layout.cluster_offset(entry.start_cluster);
    assert_eq!(&img[offset..offset + 512], &data[..512]);
    assert_eq!(&layout.slot(&img, 2, 0)[0..11], b"A       BIN");
    // Only the new chain changed in the mirrored FAT
    let fat2_after = &img[fat2_start..fat2_start + 512];
    for cluster in 0..128usize {
        if cluster as u32 == entry.start_cluster || cluster as u32 == entry.start_cluster + 1 {
            continue;
        }
        assert_eq!(
            fat2_after[cluster * 4..cluster * 4 + 4],
            fat2_before[cluster * 4..cluster * 4 + 4],
            "FAT entry {}",
            cluster
        );
    }
}

#[test]
fn rejects_a_blank_card() {
    common::init_logging();
    let img = vec![0u8; 512 * 64];
    let result = Fat32Volume::mount(ImageDisk::new(Cursor::new(img)));
    assert!(matches!(result, Err(Fat32Error::NotFat32 { .. })));
}

#[test]
fn rejects_an_mbr_with_an_empty_first_partition() {
    common::init_logging();
    let mut img = vec![0u8; 512 * 64];
    img[510] = 0x55;
    img[511] = 0xAA;
    let result = Fat32Volume::mount(ImageDisk::new(Cursor::new(img)));
    assert!(matches!(result, Err(Fat32Error::NotFat32 { .. })));
}

#[test]
fn implausible_free_count_is_not_trusted() {
    let image = ImageSpec::default();
    let layout = image.layout();
    let mut img = image.build();
    common::put_u32(&mut img, layout.fsinfo_offset() + 488, layout.total_clusters + 5);

    let mut volume = common::mount(img);
    assert!(!volume.session().free_count_valid);
    assert_eq!(volume.statistics().unwrap().free_clusters, None);

    // Writes leave the untrusted count alone
    common::write_file(&mut volume, "A.TXT", b"abc");
    assert_eq!(
        volume.fs_info_get(FsInfoField::FreeClusterCount).unwrap(),
        Some(layout.total_clusters + 5)
    );

    let free = volume.recount_free_clusters().unwrap();
    assert_eq!(free, layout.total_clusters - 2);
    assert!(volume.session().free_count_valid);
    assert_eq!(volume.statistics().unwrap().free_clusters, Some(free));
}

#[test]
fn recount_rebuilds_a_missing_fsinfo_sector() {
    let image = ImageSpec::default();
    let layout = image.layout();
    let mut img = image.build();
    img[layout.fsinfo_offset()..layout.fsinfo_offset() + 512].fill(0);

    let mut volume = common::mount(img);
    assert!(!volume.session().free_count_valid);
    assert_eq!(volume.fs_info_get(FsInfoField::FreeClusterCount).unwrap(), None);

    assert_eq!(volume.recount_free_clusters().unwrap(), layout.total_clusters - 1);
    assert_eq!(
        volume.fs_info_get(FsInfoField::NextFreeCluster).unwrap(),
        Some(3)
    );
}

#[test]
fn statistics_follow_writes_and_deletes() {
    let image = ImageSpec {
        sectors_per_cluster: 2,
        ..ImageSpec::default()
    };
    let layout = image.layout();
    let mut volume = common::mount(image.build());

    let before = volume.statistics().unwrap();
    assert_eq!(before.cluster_bytes, 1024);
    assert_eq!(before.total_clusters, layout.total_clusters);
    assert_eq!(before.total_bytes, layout.total_clusters as u64 * 1024);
    assert_eq!(before.free_clusters, Some(layout.total_clusters - 1));

    common::write_file(&mut volume, "FOUR.BIN", &common::pattern(4000));
    let after_write = volume.statistics().unwrap();
    assert_eq!(after_write.free_clusters, Some(layout.total_clusters - 5));
    assert_eq!(after_write.free_bytes, Some((layout.total_clusters - 5) as u64 * 1024));

    volume.delete("FOUR.BIN").unwrap();
    assert_eq!(volume.statistics().unwrap().free_clusters, before.free_clusters);
}

#[test]
fn transient_fat_read_failures_are_retried() {
    common::init_logging();
    let image = ImageSpec::default();
    let fat_sector = image.layout().part + RESERVED_SECTORS;
    let (disk, faults) = FlakyDisk::new(ImageDisk::new(Cursor::new(image.build())));
    let mut volume = Fat32Volume::mount(disk).unwrap();

    faults.borrow_mut().read_failures.insert(fat_sector, 3);
    let mut writer = volume.open_for_write("RETRY.BIN").unwrap();
    writer.write_block(&common::pattern(700)).unwrap();
    writer.close().unwrap();

    assert_eq!(faults.borrow().read_failures[&fat_sector], 0);
    assert!(faults.borrow().reads[&fat_sector] >= 4);

    let mut out = Vec::new();
    volume
        .open_for_read("RETRY.BIN")
        .unwrap()
        .read_to_vec(&mut out)
        .unwrap();
    assert_eq!(out, common::pattern(700));
}

#[test]
fn persistent_fat_read_failure_gives_up_after_the_retry_budget() {
    common::init_logging();
    let image = ImageSpec::default();
    let fat_sector = image.layout().part + RESERVED_SECTORS;
    let (disk, faults) = FlakyDisk::new(ImageDisk::new(Cursor::new(image.build())));
    let options = MountOptions::default().read_retries(2);
    let mut volume = Fat32Volume::mount_with(disk, options).unwrap();

    faults.borrow_mut().read_failures.insert(fat_sector, 5);
    let result = volume.open_for_write("FAIL.BIN");
    assert!(matches!(
        result,
        Err(Fat32Error::ReadFailed { sector, .. }) if sector == fat_sector
    ));
    assert_eq!(faults.borrow().read_failures[&fat_sector], 3);
}

#[test]
fn fsinfo_write_failure_degrades_instead_of_failing() {
    common::init_logging();
    let image = ImageSpec::default();
    let layout = image.layout();
    let (disk, faults) = FlakyDisk::new(ImageDisk::new(Cursor::new(image.build())));
    let mut volume = Fat32Volume::mount(disk).unwrap();
    assert_eq!(volume.degraded(), None);

    faults.borrow_mut().failing_writes.insert(1);
    let mut writer = volume.open_for_write("STALE.TXT").unwrap();
    writer.write_block(b"still written").unwrap();
    writer.close().unwrap();
    assert_eq!(
        volume.degraded(),
        Some(Degraded::FsInfoWriteFailed { sector: 1 })
    );

    let mut out = Vec::new();
    volume
        .open_for_read("STALE.TXT")
        .unwrap()
        .read_to_vec(&mut out)
        .unwrap();
    assert_eq!(out, b"still written");

    faults.borrow_mut().failing_writes.clear();
    assert_eq!(
        volume.recount_free_clusters().unwrap(),
        layout.total_clusters - 2
    );
    assert_eq!(volume.degraded(), None);
}

#[test]
fn directory_entry_write_failure_is_an_error() {
    common::init_logging();
    let image = ImageSpec::default();
    let root_sector = image.layout().first_data;
    let (disk, faults) = FlakyDisk::new(ImageDisk::new(Cursor::new(image.build())));
    let mut volume = Fat32Volume::mount(disk).unwrap();

    faults.borrow_mut().failing_writes.insert(root_sector);
    let mut writer = volume.open_for_write("LOST.TXT").unwrap();
    writer.write_block(b"data").unwrap();
    let result = writer.close();
    assert!(matches!(
        result,
        Err(Fat32Error::WriteFailed { sector, .. }) if sector == root_sector
    ));

    faults.borrow_mut().failing_writes.clear();
    assert!(volume.find_file("LOST.TXT").unwrap().is_none());
}

#[test]
fn image_file_round_trip() {
    use std::io::Write;

    common::init_logging();
    let image = ImageSpec::default();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&image.build()).unwrap();
    file.flush().unwrap();

    let data = common::pattern(5000);
    {
        let disk = ImageDisk::open(file.path()).unwrap();
        let mut volume = Fat32Volume::mount(disk).unwrap();
        let mut writer = volume.open_for_write("On Disk Image.dat").unwrap();
        writer.write_block(&data).unwrap();
        writer.close().unwrap();
        volume.unmount();
    }

    let disk = ImageDisk::open(file.path()).unwrap();
    let mut volume = Fat32Volume::mount(disk).unwrap();
    let files = volume.list_directory().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "On Disk Image.dat");
    assert_eq!(files[0].size, 5000);

    let mut out = Vec::new();
    volume
        .open_for_read("on disk image.DAT")
        .unwrap()
        .read_to_vec(&mut out)
        .unwrap();
    assert_eq!(out, data);
}
